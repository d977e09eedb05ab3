use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mercato_core::{DiscountCodeId, EngineError, EngineResult, Entity, Money};

/// How an order-level discount is computed from the order subtotal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DiscountRule {
    /// `subtotal * value / 100`, optionally capped.
    Percentage {
        /// Percentage off, 0..=100.
        value: u8,
        max_discount: Option<Money>,
    },
    /// A flat amount, clamped to the subtotal so the total never goes
    /// negative.
    Fixed { value: Money },
}

/// An order-level discount code.
///
/// Codes match case-insensitively. The usage counter is incremented exactly
/// once per invoice that applies the code and decremented exactly once if that
/// invoice is later cancelled or refunded; the orchestrator enforces the
/// once-per-invoice rule, the ledger enforces the limit atomically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountCode {
    pub id: DiscountCodeId,
    pub code: String,
    pub rule: DiscountRule,
    pub min_order_value: Option<Money>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub usage_limit: Option<u32>,
    pub usage_count: u32,
}

impl DiscountCode {
    pub fn matches(&self, code: &str) -> bool {
        self.code.eq_ignore_ascii_case(code.trim())
    }

    pub fn has_usage_headroom(&self) -> bool {
        match self.usage_limit {
            Some(limit) => self.usage_count < limit,
            None => true,
        }
    }

    /// Validate that this code can be applied to an order of `order_value`
    /// at time `at`.
    pub fn validate(&self, order_value: Money, at: DateTime<Utc>) -> EngineResult<()> {
        if at < self.starts_at || at > self.ends_at {
            return Err(EngineError::validation(format!(
                "discount code {} is outside its validity window",
                self.code
            )));
        }
        if let Some(min) = self.min_order_value {
            if order_value < min {
                return Err(EngineError::validation(format!(
                    "order value {} is below the {} minimum for code {}",
                    order_value, min, self.code
                )));
            }
        }
        if !self.has_usage_headroom() {
            return Err(EngineError::DiscountExhausted);
        }
        Ok(())
    }

    /// The discount amount for an order subtotal.
    ///
    /// Fixed discounts are clamped to the subtotal; a percentage cap applies
    /// after the percentage is taken.
    pub fn discount_amount(&self, subtotal: Money) -> Money {
        match &self.rule {
            DiscountRule::Percentage {
                value,
                max_discount,
            } => {
                let amount = subtotal.percent((*value).min(100));
                match max_discount {
                    Some(cap) => amount.min(*cap),
                    None => amount,
                }
            }
            DiscountRule::Fixed { value } => (*value).min(subtotal),
        }
    }
}

impl Entity for DiscountCode {
    type Id = DiscountCodeId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// Discount usage accountant port.
///
/// `apply_usage` must re-check the limit and increment in one atomic step so
/// two racing invoices cannot both consume the last use.
pub trait DiscountLedger: Send + Sync {
    /// Case-insensitive code lookup.
    fn find_by_code(&self, code: &str) -> EngineResult<Option<DiscountCode>>;

    /// Atomic limit re-check + increment; `DiscountExhausted` if the limit
    /// was reached between validation and apply.
    fn apply_usage(&self, id: DiscountCodeId) -> EngineResult<()>;

    /// Decrement the usage counter, floored at zero.
    fn revert_usage(&self, id: DiscountCodeId) -> EngineResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn code(rule: DiscountRule) -> DiscountCode {
        let now = Utc::now();
        DiscountCode {
            id: DiscountCodeId::new(),
            code: "SAVE10".into(),
            rule,
            min_order_value: Some(Money::from_minor(5000)),
            starts_at: now - Duration::days(1),
            ends_at: now + Duration::days(1),
            usage_limit: Some(3),
            usage_count: 0,
        }
    }

    #[test]
    fn code_matching_is_case_insensitive() {
        let c = code(DiscountRule::Fixed {
            value: Money::from_minor(100),
        });
        assert!(c.matches("save10"));
        assert!(c.matches(" SAVE10 "));
        assert!(!c.matches("save20"));
    }

    #[test]
    fn percentage_amount_with_and_without_cap() {
        let uncapped = code(DiscountRule::Percentage {
            value: 10,
            max_discount: None,
        });
        assert_eq!(
            uncapped.discount_amount(Money::from_minor(8000)),
            Money::from_minor(800)
        );

        let capped = code(DiscountRule::Percentage {
            value: 10,
            max_discount: Some(Money::from_minor(500)),
        });
        assert_eq!(
            capped.discount_amount(Money::from_minor(8000)),
            Money::from_minor(500)
        );
    }

    #[test]
    fn fixed_amount_is_clamped_to_subtotal() {
        let c = code(DiscountRule::Fixed {
            value: Money::from_minor(10_000),
        });
        assert_eq!(
            c.discount_amount(Money::from_minor(6000)),
            Money::from_minor(6000)
        );
    }

    #[test]
    fn validate_enforces_window_minimum_and_limit() {
        let now = Utc::now();
        let mut c = code(DiscountRule::Percentage {
            value: 10,
            max_discount: None,
        });

        assert!(c.validate(Money::from_minor(8000), now).is_ok());

        let err = c
            .validate(Money::from_minor(8000), now + Duration::days(30))
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let err = c.validate(Money::from_minor(4000), now).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        c.usage_count = 3;
        let err = c.validate(Money::from_minor(8000), now).unwrap_err();
        assert_eq!(err, EngineError::DiscountExhausted);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn discount_amount_never_exceeds_subtotal(
                subtotal in 0u64..=100_000_000,
                pct in 0u8..=100,
                fixed in 0u64..=200_000_000,
            ) {
                let sub = Money::from_minor(subtotal);
                let p = code(DiscountRule::Percentage { value: pct, max_discount: None });
                prop_assert!(p.discount_amount(sub) <= sub);
                let f = code(DiscountRule::Fixed { value: Money::from_minor(fixed) });
                prop_assert!(f.discount_amount(sub) <= sub);
            }
        }
    }
}
