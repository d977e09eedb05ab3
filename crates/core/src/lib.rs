//! `mercato-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod entity;
pub mod error;
pub mod id;
pub mod money;

pub use entity::Entity;
pub use error::{EngineError, EngineResult};
pub use id::{CustomerId, DiscountCodeId, InvoiceId, ProductId, UserId};
pub use money::Money;
