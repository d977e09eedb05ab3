//! Invoicing domain module: the invoice lifecycle engine.
//!
//! The engine coordinates stock reservation, discount-usage accounting,
//! customer-statistics updates, and payment-state transitions as one logical
//! unit of work per operation. Where the store offers no multi-document
//! transaction, every step carries a compensating action that is unwound in
//! reverse on failure.

pub mod engine;
pub mod invoice;
pub mod ports;
pub mod stats;

pub use engine::{
    CreateInvoiceRequest, EnginePorts, InvoiceEngine, RefundRequest, RequestedLine,
    TransitionPayload,
};
pub use invoice::{
    AppliedDiscount, AuditRecord, Invoice, InvoiceStatus, LineItem, PaymentMethod, PaymentRecord,
    PaymentStatus, RefundRecord, invoice_number, is_valid_transaction_id,
};
pub use ports::{AuditEntry, AuditSink, BankProfile, InvoiceSequence, InvoiceStore, PaymentQrProvider, StoreProfile};
pub use stats::{DailyRevenue, DateRange, InvoiceStatistics, PaymentMethodBreakdown, ProductSales};
