use serde::{Deserialize, Serialize};

use mercato_core::{EngineResult, ProductId};

/// One product/quantity pair in a reservation or release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLine {
    pub product_id: ProductId,
    pub quantity: u64,
}

impl StockLine {
    pub fn new(product_id: ProductId, quantity: u64) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// Inventory ledger port.
///
/// `reserve` is all-or-nothing across its lines: each line is a conditional
/// compare-and-decrement at the store, and on any failure the lines already
/// decremented in the same call are re-credited before the error is returned.
/// Implementations must be safe under concurrent reservation of the same
/// product; read-then-write in application code is not acceptable.
pub trait StockLedger: Send + Sync {
    /// Atomically reserve every line or none of them.
    ///
    /// Fails with `InsufficientStock { product_id }` naming the first line
    /// that could not be satisfied.
    fn reserve(&self, lines: &[StockLine]) -> EngineResult<()>;

    /// Unconditionally re-credit stock. Never fails on business grounds; a
    /// negative starting count is incremented, not clamped.
    fn release(&self, lines: &[StockLine]) -> EngineResult<()>;

    /// Current available quantity.
    fn available(&self, product_id: ProductId) -> EngineResult<u64>;
}

/// Coarse availability classification for a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    InStock,
    LowStock,
    OutOfStock,
}

/// Classify availability against a low-stock threshold.
pub fn stock_status(available: u64, low_threshold: u64) -> StockStatus {
    if available == 0 {
        StockStatus::OutOfStock
    } else if available <= low_threshold {
        StockStatus::LowStock
    } else {
        StockStatus::InStock
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_status_classifies_thresholds() {
        assert_eq!(stock_status(0, 5), StockStatus::OutOfStock);
        assert_eq!(stock_status(1, 5), StockStatus::LowStock);
        assert_eq!(stock_status(5, 5), StockStatus::LowStock);
        assert_eq!(stock_status(6, 5), StockStatus::InStock);
    }

    #[test]
    fn zero_threshold_means_any_stock_is_in_stock() {
        assert_eq!(stock_status(1, 0), StockStatus::InStock);
        assert_eq!(stock_status(0, 0), StockStatus::OutOfStock);
    }
}
