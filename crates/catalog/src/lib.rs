//! Catalog domain module: products and the pricing calculator.
//!
//! This crate contains business rules for products and pricing, implemented
//! purely as deterministic domain logic (no IO, no HTTP, no storage).

pub mod pricing;
pub mod product;

pub use pricing::{effective_price, line_subtotal};
pub use product::{Product, ProductCatalog, ProductDiscount, ProductStatus};
