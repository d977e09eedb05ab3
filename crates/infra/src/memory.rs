//! In-memory port implementations.
//!
//! Suitable for tests and for embedding the engine without a real store.
//! Each store serializes its mutations behind a `Mutex`, so compare-and-swap
//! style checks (stock, usage limits) are race-free.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use tracing::debug;

use mercato_catalog::{Product, ProductCatalog};
use mercato_core::{
    CustomerId, DiscountCodeId, EngineError, EngineResult, InvoiceId, Money, ProductId,
};
use mercato_customers::{Customer, CustomerLedger};
use mercato_discounts::{DiscountCode, DiscountLedger};
use mercato_inventory::{StockLedger, StockLine};
use mercato_invoicing::{
    AuditEntry, AuditSink, BankProfile, Invoice, InvoiceSequence, InvoiceStore, PaymentQrProvider,
    StoreProfile,
};

fn lock<'a, T>(mutex: &'a Mutex<T>) -> EngineResult<std::sync::MutexGuard<'a, T>> {
    mutex
        .lock()
        .map_err(|_| EngineError::infrastructure("store lock poisoned"))
}

/// Product catalog + inventory ledger over one product map.
///
/// Catalog reads and stock writes share the map because stock lives on the
/// product document, mirroring the persisted shape.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    products: Mutex<HashMap<ProductId, Product>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, product: Product) {
        if let Ok(mut products) = self.products.lock() {
            products.insert(product.id, product);
        }
    }

    pub fn get(&self, id: ProductId) -> Option<Product> {
        self.products.lock().ok()?.get(&id).cloned()
    }
}

impl ProductCatalog for InMemoryCatalog {
    fn get_active(&self, id: ProductId) -> EngineResult<Product> {
        let products = lock(&self.products)?;
        match products.get(&id) {
            Some(p) if p.can_be_sold() => Ok(p.clone()),
            Some(_) => Err(EngineError::not_found(format!("product {id} is not sellable"))),
            None => Err(EngineError::not_found(format!("product {id}"))),
        }
    }
}

impl StockLedger for InMemoryCatalog {
    fn reserve(&self, lines: &[StockLine]) -> EngineResult<()> {
        // One critical section for the whole call: the per-line checks below
        // cannot interleave with a concurrent reserve.
        let mut products = lock(&self.products)?;
        let mut decremented: Vec<StockLine> = Vec::with_capacity(lines.len());
        for line in lines {
            let ok = match products.get_mut(&line.product_id) {
                Some(p) if p.stock >= line.quantity => {
                    p.stock -= line.quantity;
                    decremented.push(*line);
                    true
                }
                _ => false,
            };
            if !ok {
                // Re-credit what this call already took before failing.
                for undo in decremented {
                    if let Some(p) = products.get_mut(&undo.product_id) {
                        p.stock += undo.quantity;
                    }
                }
                return Err(EngineError::insufficient_stock(line.product_id));
            }
        }
        Ok(())
    }

    fn release(&self, lines: &[StockLine]) -> EngineResult<()> {
        let mut products = lock(&self.products)?;
        for line in lines {
            match products.get_mut(&line.product_id) {
                Some(p) => p.stock += line.quantity,
                None => {
                    debug!(product_id = %line.product_id, "release for unknown product ignored")
                }
            }
        }
        Ok(())
    }

    fn available(&self, product_id: ProductId) -> EngineResult<u64> {
        let products = lock(&self.products)?;
        products
            .get(&product_id)
            .map(|p| p.stock)
            .ok_or_else(|| EngineError::not_found(format!("product {product_id}")))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCustomers {
    customers: Mutex<HashMap<CustomerId, Customer>>,
}

impl InMemoryCustomers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, customer: Customer) {
        if let Ok(mut customers) = self.customers.lock() {
            customers.insert(customer.id, customer);
        }
    }

    pub fn get(&self, id: CustomerId) -> Option<Customer> {
        self.customers.lock().ok()?.get(&id).cloned()
    }

    fn with_customer(
        &self,
        id: CustomerId,
        f: impl FnOnce(&mut Customer) -> EngineResult<()>,
    ) -> EngineResult<()> {
        let mut customers = lock(&self.customers)?;
        let customer = customers
            .get_mut(&id)
            .ok_or_else(|| EngineError::not_found(format!("customer {id}")))?;
        f(customer)
    }
}

impl CustomerLedger for InMemoryCustomers {
    fn get_active(&self, id: CustomerId) -> EngineResult<Customer> {
        let customers = lock(&self.customers)?;
        match customers.get(&id) {
            Some(c) if c.active => Ok(c.clone()),
            Some(_) => Err(EngineError::not_found(format!("customer {id} is inactive"))),
            None => Err(EngineError::not_found(format!("customer {id}"))),
        }
    }

    fn record_purchase(
        &self,
        customer_id: CustomerId,
        invoice_id: InvoiceId,
        at: DateTime<Utc>,
    ) -> EngineResult<()> {
        self.with_customer(customer_id, |c| {
            c.record_purchase(invoice_id, at);
            Ok(())
        })
    }

    fn revert_purchase(&self, customer_id: CustomerId, invoice_id: InvoiceId) -> EngineResult<()> {
        self.with_customer(customer_id, |c| {
            c.revert_purchase(invoice_id);
            Ok(())
        })
    }

    fn record_completion(
        &self,
        customer_id: CustomerId,
        amount: Money,
        at: DateTime<Utc>,
    ) -> EngineResult<()> {
        self.with_customer(customer_id, |c| c.record_completion(amount, at))
    }

    fn revert_completion(&self, customer_id: CustomerId, amount: Money) -> EngineResult<()> {
        self.with_customer(customer_id, |c| {
            c.revert_completion(amount);
            Ok(())
        })
    }
}

#[derive(Debug, Default)]
pub struct InMemoryDiscounts {
    codes: Mutex<HashMap<DiscountCodeId, DiscountCode>>,
}

impl InMemoryDiscounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, code: DiscountCode) {
        if let Ok(mut codes) = self.codes.lock() {
            codes.insert(code.id, code);
        }
    }

    pub fn get(&self, id: DiscountCodeId) -> Option<DiscountCode> {
        self.codes.lock().ok()?.get(&id).cloned()
    }
}

impl DiscountLedger for InMemoryDiscounts {
    fn find_by_code(&self, code: &str) -> EngineResult<Option<DiscountCode>> {
        let codes = lock(&self.codes)?;
        Ok(codes.values().find(|c| c.matches(code)).cloned())
    }

    fn apply_usage(&self, id: DiscountCodeId) -> EngineResult<()> {
        // Limit re-check and increment under one lock: the usage counter
        // cannot overshoot its limit even under concurrent applies.
        let mut codes = lock(&self.codes)?;
        let code = codes
            .get_mut(&id)
            .ok_or_else(|| EngineError::not_found(format!("discount {id}")))?;
        if !code.has_usage_headroom() {
            return Err(EngineError::DiscountExhausted);
        }
        code.usage_count += 1;
        Ok(())
    }

    fn revert_usage(&self, id: DiscountCodeId) -> EngineResult<()> {
        let mut codes = lock(&self.codes)?;
        let code = codes
            .get_mut(&id)
            .ok_or_else(|| EngineError::not_found(format!("discount {id}")))?;
        code.usage_count = code.usage_count.saturating_sub(1);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryInvoices {
    invoices: Mutex<HashMap<InvoiceId, Invoice>>,
}

impl InMemoryInvoices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.invoices.lock().map(|i| i.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl InvoiceStore for InMemoryInvoices {
    fn insert(&self, invoice: &Invoice) -> EngineResult<()> {
        let mut invoices = lock(&self.invoices)?;
        if invoices.contains_key(&invoice.id) {
            return Err(EngineError::infrastructure(format!(
                "duplicate invoice id {}",
                invoice.id
            )));
        }
        invoices.insert(invoice.id, invoice.clone());
        Ok(())
    }

    fn update(&self, invoice: &Invoice) -> EngineResult<()> {
        let mut invoices = lock(&self.invoices)?;
        if !invoices.contains_key(&invoice.id) {
            return Err(EngineError::not_found(format!("invoice {}", invoice.id)));
        }
        invoices.insert(invoice.id, invoice.clone());
        Ok(())
    }

    fn get(&self, id: InvoiceId) -> EngineResult<Invoice> {
        let invoices = lock(&self.invoices)?;
        invoices
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("invoice {id}")))
    }

    fn remove(&self, id: InvoiceId) -> EngineResult<()> {
        let mut invoices = lock(&self.invoices)?;
        invoices.remove(&id);
        Ok(())
    }

    fn list(&self) -> EngineResult<Vec<Invoice>> {
        let invoices = lock(&self.invoices)?;
        Ok(invoices.values().cloned().collect())
    }
}

/// Monotonic invoice-number sequence backed by an atomic counter.
#[derive(Debug)]
pub struct AtomicInvoiceSequence {
    next: AtomicU64,
}

impl AtomicInvoiceSequence {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }
}

impl Default for AtomicInvoiceSequence {
    fn default() -> Self {
        Self::new()
    }
}

impl InvoiceSequence for AtomicInvoiceSequence {
    fn next(&self) -> EngineResult<u64> {
        Ok(self.next.fetch_add(1, Ordering::SeqCst))
    }
}

/// Fixed store configuration.
#[derive(Debug, Default)]
pub struct StaticStoreProfile {
    bank: Option<BankProfile>,
}

impl StaticStoreProfile {
    pub fn with_bank(bank: BankProfile) -> Self {
        Self { bank: Some(bank) }
    }

    pub fn without_bank() -> Self {
        Self { bank: None }
    }
}

impl StoreProfile for StaticStoreProfile {
    fn bank_profile(&self) -> EngineResult<BankProfile> {
        self.bank
            .clone()
            .ok_or_else(|| EngineError::not_found("bank profile"))
    }
}

/// Deterministic QR provider that renders a payment url.
///
/// Stands in for the external QR collaborator; real deployments swap in an
/// HTTP-backed implementation.
#[derive(Debug, Default)]
pub struct UrlQrProvider;

impl PaymentQrProvider for UrlQrProvider {
    fn generate(&self, invoice: &Invoice, bank: &BankProfile) -> EngineResult<String> {
        Ok(format!(
            "https://pay.example/qr/{}?account={}&amount={}",
            invoice.invoice_number,
            bank.account_number,
            invoice.total.minor()
        ))
    }
}

/// Audit sink that keeps every forwarded entry, for inspection in tests.
#[derive(Debug, Default)]
pub struct RecordingAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl RecordingAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl AuditSink for RecordingAuditSink {
    fn record(&self, entry: &AuditEntry) -> EngineResult<()> {
        let mut entries = lock(&self.entries)?;
        entries.push(entry.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mercato_catalog::ProductStatus;

    fn product(stock: u64) -> Product {
        Product {
            id: ProductId::new(),
            sku: "SKU".into(),
            name: "Widget".into(),
            status: ProductStatus::Active,
            base_price: Money::from_minor(1000),
            stock,
            discount: None,
        }
    }

    #[test]
    fn reserve_is_all_or_nothing() {
        let catalog = InMemoryCatalog::new();
        let a = product(5);
        let b = product(1);
        let (a_id, b_id) = (a.id, b.id);
        catalog.insert(a);
        catalog.insert(b);

        let err = catalog
            .reserve(&[StockLine::new(a_id, 3), StockLine::new(b_id, 2)])
            .unwrap_err();
        assert_eq!(err, EngineError::insufficient_stock(b_id));
        // The first line's decrement was rolled back.
        assert_eq!(catalog.available(a_id).unwrap(), 5);
        assert_eq!(catalog.available(b_id).unwrap(), 1);

        catalog
            .reserve(&[StockLine::new(a_id, 3), StockLine::new(b_id, 1)])
            .unwrap();
        assert_eq!(catalog.available(a_id).unwrap(), 2);
        assert_eq!(catalog.available(b_id).unwrap(), 0);
    }

    #[test]
    fn concurrent_reserves_never_oversell() {
        use std::sync::Arc;

        let catalog = Arc::new(InMemoryCatalog::new());
        let p = product(10);
        let id = p.id;
        catalog.insert(p);

        let mut handles = Vec::new();
        for _ in 0..20 {
            let catalog = Arc::clone(&catalog);
            handles.push(std::thread::spawn(move || {
                catalog.reserve(&[StockLine::new(id, 1)]).is_ok()
            }));
        }
        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap_or(false))
            .filter(|ok| *ok)
            .count();

        assert_eq!(successes, 10);
        assert_eq!(catalog.available(id).unwrap(), 0);
    }

    #[test]
    fn apply_usage_enforces_limit_atomically() {
        use chrono::Duration;

        let discounts = InMemoryDiscounts::new();
        let now = Utc::now();
        let code = DiscountCode {
            id: DiscountCodeId::new(),
            code: "LAST1".into(),
            rule: mercato_discounts::DiscountRule::Fixed {
                value: Money::from_minor(100),
            },
            min_order_value: None,
            starts_at: now - Duration::days(1),
            ends_at: now + Duration::days(1),
            usage_limit: Some(1),
            usage_count: 0,
        };
        let id = code.id;
        discounts.insert(code);

        discounts.apply_usage(id).unwrap();
        assert_eq!(discounts.apply_usage(id).unwrap_err(), EngineError::DiscountExhausted);
        assert_eq!(discounts.get(id).unwrap().usage_count, 1);

        discounts.revert_usage(id).unwrap();
        discounts.revert_usage(id).unwrap();
        assert_eq!(discounts.get(id).unwrap().usage_count, 0);
    }

    #[test]
    fn sequence_is_monotonic() {
        let seq = AtomicInvoiceSequence::new();
        assert_eq!(seq.next().unwrap(), 1);
        assert_eq!(seq.next().unwrap(), 2);
        assert_eq!(seq.next().unwrap(), 3);
    }
}
