//! Customers domain module: customer records and purchase aggregates.

pub mod customer;

pub use customer::{Customer, CustomerLedger};
