use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mercato_core::{CustomerId, EngineResult, Entity, InvoiceId, Money};

/// A customer record with embedded purchase aggregates.
///
/// Invariant: `purchase_history.len() == total_purchases` once the engine has
/// processed every invoice referencing this customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub active: bool,
    /// Ordered invoice references (oldest first).
    pub purchase_history: Vec<InvoiceId>,
    pub total_purchases: u64,
    /// Aggregate spend from completed invoices.
    pub total_spent: Money,
    pub last_purchase_at: Option<DateTime<Utc>>,
}

impl Customer {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: CustomerId::new(),
            name: name.into(),
            email: email.into(),
            phone: None,
            active: true,
            purchase_history: Vec::new(),
            total_purchases: 0,
            total_spent: Money::ZERO,
            last_purchase_at: None,
        }
    }

    /// Append an invoice reference and bump the purchase aggregates.
    pub fn record_purchase(&mut self, invoice_id: InvoiceId, at: DateTime<Utc>) {
        self.purchase_history.push(invoice_id);
        self.total_purchases += 1;
        self.last_purchase_at = Some(at);
    }

    /// Remove an invoice reference if present; the counter floors at zero.
    pub fn revert_purchase(&mut self, invoice_id: InvoiceId) {
        if let Some(pos) = self.purchase_history.iter().position(|id| *id == invoice_id) {
            self.purchase_history.remove(pos);
        }
        self.total_purchases = self.total_purchases.saturating_sub(1);
    }

    /// Add a completed invoice's total to the spend aggregate.
    pub fn record_completion(&mut self, amount: Money, at: DateTime<Utc>) -> EngineResult<()> {
        self.total_spent = self.total_spent.checked_add(amount)?;
        self.last_purchase_at = Some(at);
        Ok(())
    }

    /// Undo a completed invoice's spend contribution (floored at zero).
    pub fn revert_completion(&mut self, amount: Money) {
        self.total_spent = self.total_spent.saturating_sub(amount);
    }

    pub fn history_is_consistent(&self) -> bool {
        self.purchase_history.len() as u64 == self.total_purchases
    }
}

impl Entity for Customer {
    type Id = CustomerId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// Customer ledger port: purchase-history bookkeeping for the invoice engine.
///
/// Implementations must apply each mutation atomically with respect to
/// concurrent callers.
pub trait CustomerLedger: Send + Sync {
    /// Fetch a customer that exists and is active; `NotFound` otherwise.
    fn get_active(&self, id: CustomerId) -> EngineResult<Customer>;

    fn record_purchase(
        &self,
        customer_id: CustomerId,
        invoice_id: InvoiceId,
        at: DateTime<Utc>,
    ) -> EngineResult<()>;

    fn revert_purchase(&self, customer_id: CustomerId, invoice_id: InvoiceId) -> EngineResult<()>;

    fn record_completion(
        &self,
        customer_id: CustomerId,
        amount: Money,
        at: DateTime<Utc>,
    ) -> EngineResult<()>;

    fn revert_completion(&self, customer_id: CustomerId, amount: Money) -> EngineResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_and_revert_purchase_keep_history_consistent() {
        let mut c = Customer::new("Ada", "ada@example.com");
        let inv = InvoiceId::new();
        let now = Utc::now();

        c.record_purchase(inv, now);
        assert_eq!(c.total_purchases, 1);
        assert_eq!(c.purchase_history, vec![inv]);
        assert_eq!(c.last_purchase_at, Some(now));
        assert!(c.history_is_consistent());

        c.revert_purchase(inv);
        assert_eq!(c.total_purchases, 0);
        assert!(c.purchase_history.is_empty());
        assert!(c.history_is_consistent());
    }

    #[test]
    fn revert_purchase_of_unknown_invoice_floors_counter() {
        let mut c = Customer::new("Ada", "ada@example.com");
        c.revert_purchase(InvoiceId::new());
        assert_eq!(c.total_purchases, 0);
    }

    #[test]
    fn completion_aggregates_spend_and_floors_on_revert() {
        let mut c = Customer::new("Ada", "ada@example.com");
        c.record_completion(Money::from_minor(7200), Utc::now()).unwrap();
        assert_eq!(c.total_spent, Money::from_minor(7200));

        c.revert_completion(Money::from_minor(9999));
        assert_eq!(c.total_spent, Money::ZERO);
    }
}
