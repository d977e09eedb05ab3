//! Inventory domain module: stock reservation semantics.
//!
//! This crate contains the inventory ledger contract and the stock-status
//! helper; storage-backed implementations live in `mercato-infra`.

pub mod stock;

pub use stock::{StockLedger, StockLine, StockStatus, stock_status};
