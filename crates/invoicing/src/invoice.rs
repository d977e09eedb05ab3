use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use mercato_core::{CustomerId, DiscountCodeId, Entity, InvoiceId, Money, ProductId, UserId};
use mercato_discounts::DiscountRule;
use mercato_inventory::StockLine;

/// Invoice lifecycle status.
///
/// `Canceled` and `Refunded` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Pending,
    Confirmed,
    Paid,
    Completed,
    Canceled,
    Refunded,
}

impl InvoiceStatus {
    pub const ALL: [InvoiceStatus; 6] = [
        InvoiceStatus::Pending,
        InvoiceStatus::Confirmed,
        InvoiceStatus::Paid,
        InvoiceStatus::Completed,
        InvoiceStatus::Canceled,
        InvoiceStatus::Refunded,
    ];

    /// The transition table. Anything not listed here is illegal.
    pub fn can_transition_to(self, to: InvoiceStatus) -> bool {
        use InvoiceStatus::*;
        matches!(
            (self, to),
            (Pending, Confirmed)
                | (Pending, Canceled)
                | (Confirmed, Paid)
                | (Confirmed, Canceled)
                | (Paid, Completed)
                | (Paid, Refunded)
                | (Completed, Refunded)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, InvoiceStatus::Canceled | InvoiceStatus::Refunded)
    }
}

impl core::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::Confirmed => "confirmed",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Completed => "completed",
            InvoiceStatus::Canceled => "canceled",
            InvoiceStatus::Refunded => "refunded",
        };
        f.write_str(s)
    }
}

/// Reduced three-state payment view of the canonical lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Cancelled,
}

impl From<InvoiceStatus> for PaymentStatus {
    fn from(status: InvoiceStatus) -> Self {
        match status {
            InvoiceStatus::Pending | InvoiceStatus::Confirmed => PaymentStatus::Pending,
            InvoiceStatus::Paid | InvoiceStatus::Completed => PaymentStatus::Paid,
            InvoiceStatus::Canceled | InvoiceStatus::Refunded => PaymentStatus::Cancelled,
        }
    }
}

impl core::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    BankTransfer,
}

impl core::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::BankTransfer => "bank_transfer",
        };
        f.write_str(s)
    }
}

/// One invoice line. Prices are written once at creation time so the invoice
/// stays auditable after catalog changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: ProductId,
    pub name: String,
    pub quantity: u64,
    /// Catalog base price at creation time.
    pub unit_price: Money,
    /// Price after any product-level discount active at creation time.
    pub effective_price: Money,
    /// `effective_price * quantity`.
    pub subtotal: Money,
}

impl LineItem {
    pub fn as_stock_line(&self) -> StockLine {
        StockLine::new(self.product_id, self.quantity)
    }
}

/// Snapshot of the order-level discount applied at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedDiscount {
    pub discount_id: DiscountCodeId,
    pub code: String,
    pub rule: DiscountRule,
    pub amount: Money,
}

/// Payment metadata recorded by the PAID transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub method: PaymentMethod,
    /// Required for bank transfers, `None` for cash.
    pub transaction_id: Option<String>,
    pub amount: Money,
    pub paid_at: DateTime<Utc>,
}

/// Refund metadata recorded by the REFUNDED transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRecord {
    pub amount: Money,
    pub method: PaymentMethod,
    pub reason: String,
    /// `None` for a full refund; the refunded units otherwise.
    pub lines: Option<Vec<StockLine>>,
    pub refunded_at: DateTime<Utc>,
}

/// Immutable, append-only audit entry on an invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub actor: UserId,
    pub at: DateTime<Utc>,
    pub action: String,
    pub changes: JsonValue,
}

/// The invoice document.
///
/// Owns its line items and audit history; references products, the customer,
/// and any discount code by id only. Every field except `id` and
/// `invoice_number` is mutated only through state transitions, each of which
/// appends exactly one audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub invoice_number: String,
    pub customer_id: CustomerId,
    pub lines: Vec<LineItem>,
    pub subtotal: Money,
    pub discount: Option<AppliedDiscount>,
    /// `subtotal - discount.amount`, never negative.
    pub total: Money,
    pub payment_method: PaymentMethod,
    pub status: InvoiceStatus,
    pub payment: Option<PaymentRecord>,
    pub refund: Option<RefundRecord>,
    /// Bank-transfer payment QR url, when the provider was reachable.
    pub payment_qr: Option<String>,
    pub notes: Option<String>,
    /// Guard against replaying compensations (double stock release etc.).
    pub effects_reverted: bool,
    pub issued_at: DateTime<Utc>,
    pub history: Vec<AuditRecord>,
}

impl Invoice {
    pub fn discount_amount(&self) -> Money {
        self.discount
            .as_ref()
            .map(|d| d.amount)
            .unwrap_or(Money::ZERO)
    }

    pub fn stock_lines(&self) -> Vec<StockLine> {
        self.lines.iter().map(LineItem::as_stock_line).collect()
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.status.into()
    }

    /// Append one audit record (the only way history grows).
    pub fn push_audit(
        &mut self,
        actor: UserId,
        action: impl Into<String>,
        changes: JsonValue,
        at: DateTime<Utc>,
    ) {
        self.history.push(AuditRecord {
            actor,
            at,
            action: action.into(),
            changes,
        });
    }

    /// `total == subtotal - discount` and `total >= 0` by construction; kept
    /// as a checkable predicate for tests and store round-trips.
    pub fn totals_are_consistent(&self) -> bool {
        self.subtotal.saturating_sub(self.discount_amount()) == self.total
    }
}

impl Entity for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// Format an invoice number: `INV{YY}{MM}{sequence:06}`.
///
/// The sequence comes from an atomic counter, not a racy `count + 1`.
pub fn invoice_number(at: DateTime<Utc>, sequence: u64) -> String {
    format!(
        "INV{:02}{:02}{:06}",
        at.year() % 100,
        at.month(),
        sequence
    )
}

/// Bank-transfer transaction ids: 6..=20 ASCII alphanumerics.
pub fn is_valid_transaction_id(id: &str) -> bool {
    (6..=20).contains(&id.len()) && id.bytes().all(|b| b.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn transition_table_matches_spec() {
        use InvoiceStatus::*;
        let allowed = [
            (Pending, Confirmed),
            (Pending, Canceled),
            (Confirmed, Paid),
            (Confirmed, Canceled),
            (Paid, Completed),
            (Paid, Refunded),
            (Completed, Refunded),
        ];
        for from in InvoiceStatus::ALL {
            for to in InvoiceStatus::ALL {
                let expected = allowed.contains(&(from, to));
                assert_eq!(
                    from.can_transition_to(to),
                    expected,
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn canceled_and_refunded_are_terminal() {
        for to in InvoiceStatus::ALL {
            assert!(!InvoiceStatus::Canceled.can_transition_to(to));
            assert!(!InvoiceStatus::Refunded.can_transition_to(to));
        }
        assert!(InvoiceStatus::Canceled.is_terminal());
        assert!(InvoiceStatus::Refunded.is_terminal());
        assert!(!InvoiceStatus::Paid.is_terminal());
    }

    #[test]
    fn reduced_view_maps_all_states() {
        assert_eq!(
            PaymentStatus::from(InvoiceStatus::Pending),
            PaymentStatus::Pending
        );
        assert_eq!(
            PaymentStatus::from(InvoiceStatus::Confirmed),
            PaymentStatus::Pending
        );
        assert_eq!(
            PaymentStatus::from(InvoiceStatus::Paid),
            PaymentStatus::Paid
        );
        assert_eq!(
            PaymentStatus::from(InvoiceStatus::Completed),
            PaymentStatus::Paid
        );
        assert_eq!(
            PaymentStatus::from(InvoiceStatus::Canceled),
            PaymentStatus::Cancelled
        );
        assert_eq!(
            PaymentStatus::from(InvoiceStatus::Refunded),
            PaymentStatus::Cancelled
        );
    }

    #[test]
    fn invoice_number_format() {
        let at = Utc.with_ymd_and_hms(2025, 3, 9, 12, 0, 0).unwrap();
        assert_eq!(invoice_number(at, 42), "INV2503000042");
    }

    #[test]
    fn transaction_id_validation() {
        assert!(is_valid_transaction_id("ABC123"));
        assert!(is_valid_transaction_id("a1b2c3d4e5f6g7h8i9j0"));
        assert!(!is_valid_transaction_id("short"));
        assert!(!is_valid_transaction_id("a1b2c3d4e5f6g7h8i9j0X"));
        assert!(!is_valid_transaction_id("with-dash1"));
        assert!(!is_valid_transaction_id("with space"));
        assert!(!is_valid_transaction_id(""));
    }
}
