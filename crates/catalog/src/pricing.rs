//! Pricing calculator: pure functions, no side effects.
//!
//! The orchestrator calls these explicitly before persistence; persistence
//! itself performs no business logic.

use chrono::{DateTime, Utc};

use mercato_core::{EngineError, EngineResult, Money};

use crate::product::Product;

/// A product's price after applying any currently-active, time-windowed
/// percentage discount.
pub fn effective_price(product: &Product, as_of: DateTime<Utc>) -> Money {
    match &product.discount {
        Some(d) if d.applies_at(as_of) => {
            let off = product.base_price.percent(d.percentage.min(100));
            product.base_price.saturating_sub(off)
        }
        _ => product.base_price,
    }
}

/// `effective_price * quantity`; quantity must be at least 1.
pub fn line_subtotal(effective_price: Money, quantity: u64) -> EngineResult<Money> {
    if quantity < 1 {
        return Err(EngineError::validation(
            "line quantity must be at least 1",
        ));
    }
    effective_price.checked_mul(quantity)
}
