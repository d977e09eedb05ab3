//! Ports the invoice engine is constructed with.
//!
//! The engine receives these at construction time (explicit dependency
//! injection), which lets tests substitute fakes and keeps the engine free of
//! storage assumptions. Implementations must bound their calls with a
//! timeout and surface timeouts as `EngineError::Infrastructure`.

use serde::{Deserialize, Serialize};

use mercato_core::{EngineResult, InvoiceId};

use crate::invoice::{AuditRecord, Invoice};

/// Invoice document persistence.
///
/// The store performs no business logic: totals and state are computed by the
/// engine before persistence.
pub trait InvoiceStore: Send + Sync {
    /// Persist a new invoice; fails on duplicate id.
    fn insert(&self, invoice: &Invoice) -> EngineResult<()>;

    /// Replace an existing invoice document.
    fn update(&self, invoice: &Invoice) -> EngineResult<()>;

    fn get(&self, id: InvoiceId) -> EngineResult<Invoice>;

    /// Remove an invoice (creation rollback only).
    fn remove(&self, id: InvoiceId) -> EngineResult<()>;

    fn list(&self) -> EngineResult<Vec<Invoice>>;
}

/// Atomic monotonic sequence for invoice numbers.
///
/// Replaces count-plus-one generation, which can hand two concurrent creates
/// the same number.
pub trait InvoiceSequence: Send + Sync {
    fn next(&self) -> EngineResult<u64>;
}

/// Bank account details rendered into payment QR codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankProfile {
    pub bank_name: String,
    pub account_number: String,
    pub account_holder: String,
}

/// Store configuration the engine reads the bank profile from.
pub trait StoreProfile: Send + Sync {
    fn bank_profile(&self) -> EngineResult<BankProfile>;
}

/// External payment-QR collaborator.
///
/// Failures here are non-fatal to invoice creation: the QR is refreshable
/// later, so the engine logs and proceeds with no QR.
pub trait PaymentQrProvider: Send + Sync {
    fn generate(&self, invoice: &Invoice, bank: &BankProfile) -> EngineResult<String>;
}

/// An audit record paired with the invoice it belongs to, as forwarded to the
/// external audit sink. The copy embedded in the invoice is authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub invoice_id: InvoiceId,
    pub record: AuditRecord,
}

pub trait AuditSink: Send + Sync {
    fn record(&self, entry: &AuditEntry) -> EngineResult<()>;
}
