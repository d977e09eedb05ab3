//! Discounts domain module: order-level discount codes and usage accounting.

pub mod code;

pub use code::{DiscountCode, DiscountLedger, DiscountRule};
