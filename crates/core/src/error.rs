//! Domain error model.

use thiserror::Error;

use crate::id::ProductId;
use crate::money::Money;

/// Result type used across the engine.
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine-level error.
///
/// Business failures are deterministic and safe to surface to callers.
/// `Infrastructure` wraps storage/timeout failures and is the only variant a
/// caller should treat as retryable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// A value failed validation (e.g. malformed input, bad quantity).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A customer/product/discount/invoice is missing or inactive.
    #[error("not found: {0}")]
    NotFound(String),

    /// A stock reservation could not be satisfied.
    #[error("insufficient stock for product {product_id}")]
    InsufficientStock { product_id: ProductId },

    /// The requested status change is not in the transition table.
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// The discount code's usage limit was reached.
    #[error("discount code exhausted")]
    DiscountExhausted,

    /// A partial refund's computed amount does not match the requested one.
    #[error("refund amount mismatch: requested {requested}, computed {computed}")]
    RefundAmountMismatch { requested: Money, computed: Money },

    /// Storage or timeout failure (retryable by the caller).
    #[error("infrastructure failure: {0}")]
    Infrastructure(String),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn insufficient_stock(product_id: ProductId) -> Self {
        Self::InsufficientStock { product_id }
    }

    pub fn invalid_transition(
        from: impl core::fmt::Display,
        to: impl core::fmt::Display,
    ) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn infrastructure(msg: impl Into<String>) -> Self {
        Self::Infrastructure(msg.into())
    }

    /// Whether the caller may retry the operation as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Infrastructure(_))
    }
}
