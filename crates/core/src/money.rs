//! Money as integer minor units (e.g. cents).
//!
//! Storing amounts as integers keeps discount math free of floating-point
//! drift. All constructors and arithmetic are checked; amounts are never
//! negative.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// A non-negative amount in minor currency units.
#[derive(
    Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    pub const ZERO: Money = Money(0);

    /// Construct from minor units (e.g. `Money::from_minor(1050)` == 10.50).
    pub const fn from_minor(minor: u64) -> Self {
        Self(minor)
    }

    pub const fn minor(self) -> u64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Money) -> EngineResult<Money> {
        self.0
            .checked_add(other.0)
            .map(Money)
            .ok_or_else(|| EngineError::validation("amount overflow"))
    }

    /// Subtract, flooring at zero. Discount math guarantees the subtrahend
    /// never exceeds the minuend, so the floor is a safety net only.
    pub fn saturating_sub(self, other: Money) -> Money {
        Money(self.0.saturating_sub(other.0))
    }

    /// Saturating addition for report sums that must not error out.
    pub fn saturating_add(self, other: Money) -> Money {
        Money(self.0.saturating_add(other.0))
    }

    /// Multiply by a unit count (line subtotal math).
    pub fn checked_mul(self, quantity: u64) -> EngineResult<Money> {
        self.0
            .checked_mul(quantity)
            .map(Money)
            .ok_or_else(|| EngineError::validation("amount overflow"))
    }

    /// `percent`% of this amount, rounded half-up.
    ///
    /// Intermediate math is widened to u128 so the rounding term cannot
    /// overflow.
    pub fn percent(self, percent: u8) -> Money {
        let scaled = (self.0 as u128) * (percent as u128);
        Money(((scaled + 50) / 100) as u64)
    }

    pub fn min(self, other: Money) -> Money {
        Money(self.0.min(other.0))
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_rounds_half_up() {
        assert_eq!(Money::from_minor(8000).percent(10), Money::from_minor(800));
        // 1% of 99 minor units = 0.99, rounds up to 1
        assert_eq!(Money::from_minor(99).percent(1), Money::from_minor(1));
        // 0.05 * 50% = 2.5 minor units, rounds up to 3
        assert_eq!(Money::from_minor(5).percent(50), Money::from_minor(3));
    }

    #[test]
    fn saturating_sub_floors_at_zero() {
        let a = Money::from_minor(100);
        let b = Money::from_minor(250);
        assert_eq!(a.saturating_sub(b), Money::ZERO);
    }

    #[test]
    fn checked_mul_rejects_overflow() {
        let err = Money::from_minor(u64::MAX).checked_mul(2).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn display_uses_two_decimal_places() {
        assert_eq!(Money::from_minor(1050).to_string(), "10.50");
        assert_eq!(Money::from_minor(7).to_string(), "0.07");
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn percent_never_exceeds_base(minor in 0u64..=u64::MAX / 200, pct in 0u8..=100) {
                let base = Money::from_minor(minor);
                prop_assert!(base.percent(pct) <= base);
            }

            #[test]
            fn percent_100_is_identity(minor in 0u64..=u64::MAX / 200) {
                let base = Money::from_minor(minor);
                prop_assert_eq!(base.percent(100), base);
            }
        }
    }
}
