//! Infrastructure layer: port implementations and engine wiring.
//!
//! The in-memory stores here are the reference implementations of the
//! engine's ports: every conditional update happens inside one critical
//! section, which is the behavior a real document store must reproduce with
//! atomic conditional updates.

pub mod memory;


pub use memory::{
    AtomicInvoiceSequence, InMemoryCatalog, InMemoryCustomers, InMemoryDiscounts,
    InMemoryInvoices, RecordingAuditSink, StaticStoreProfile, UrlQrProvider,
};
