//! The invoice lifecycle orchestrator.
//!
//! Multi-step operations run against a compensation stack: each completed
//! side effect pushes an undo action, and a failure in a later step unwinds
//! the stack in reverse before the error is re-raised. Compensations are
//! idempotent at the invoice level via the `effects_reverted` flag.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use mercato_catalog::{ProductCatalog, pricing};
use mercato_core::{EngineError, EngineResult, InvoiceId, Money, ProductId, UserId};
use mercato_customers::CustomerLedger;
use mercato_discounts::DiscountLedger;
use mercato_inventory::{StockLedger, StockLine};

use crate::invoice::{
    AppliedDiscount, Invoice, InvoiceStatus, LineItem, PaymentMethod, PaymentRecord, PaymentStatus,
    RefundRecord, invoice_number, is_valid_transaction_id,
};
use crate::ports::{
    AuditEntry, AuditSink, InvoiceSequence, InvoiceStore, PaymentQrProvider, StoreProfile,
};
use crate::stats::{DateRange, InvoiceStatistics, compute_statistics};

/// One requested invoice line (pricing is resolved by the engine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedLine {
    pub product_id: ProductId,
    pub quantity: u64,
}

/// Input to [`InvoiceEngine::create`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateInvoiceRequest {
    pub customer_id: mercato_core::CustomerId,
    pub lines: Vec<RequestedLine>,
    pub payment_method: PaymentMethod,
    pub discount_code: Option<String>,
    pub notes: Option<String>,
    pub actor: UserId,
}

/// Refund parameters for the REFUNDED transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRequest {
    pub amount: Money,
    pub method: PaymentMethod,
    pub reason: String,
    /// `None` refunds the whole invoice; otherwise only the listed units are
    /// restored to stock.
    pub lines: Option<Vec<StockLine>>,
}

/// State-specific payload for [`InvoiceEngine::transition`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionPayload {
    pub reason: Option<String>,
    pub transaction_id: Option<String>,
    pub amount_paid: Option<Money>,
    pub refund: Option<RefundRequest>,
}

impl TransitionPayload {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn payment(amount: Money, transaction_id: Option<String>) -> Self {
        Self {
            amount_paid: Some(amount),
            transaction_id,
            ..Self::default()
        }
    }

    pub fn cancellation(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn refund(request: RefundRequest) -> Self {
        Self {
            refund: Some(request),
            ..Self::default()
        }
    }
}

/// Ports the engine is constructed with (explicit dependency injection).
#[derive(Clone)]
pub struct EnginePorts {
    pub catalog: Arc<dyn ProductCatalog>,
    pub stock: Arc<dyn StockLedger>,
    pub discounts: Arc<dyn DiscountLedger>,
    pub customers: Arc<dyn CustomerLedger>,
    pub invoices: Arc<dyn InvoiceStore>,
    pub sequence: Arc<dyn InvoiceSequence>,
    pub store_profile: Arc<dyn StoreProfile>,
    pub payment_qr: Arc<dyn PaymentQrProvider>,
    pub audit: Arc<dyn AuditSink>,
}

/// Stack of undo actions for a multi-step operation.
///
/// Unwound in reverse on failure; discharged (dropped without running) once
/// the operation has fully succeeded. Undo failures are logged, not
/// propagated: the original error is what the caller needs to see.
struct Compensations {
    steps: Vec<(&'static str, Box<dyn FnOnce() -> EngineResult<()>>)>,
}

impl Compensations {
    fn new() -> Self {
        Self { steps: Vec::new() }
    }

    fn push(
        &mut self,
        label: &'static str,
        action: impl FnOnce() -> EngineResult<()> + 'static,
    ) {
        self.steps.push((label, Box::new(action)));
    }

    fn unwind(&mut self) {
        for (label, action) in self.steps.drain(..).rev() {
            if let Err(e) = action() {
                warn!(step = label, error = %e, "compensating action failed");
            }
        }
    }

    fn discharge(&mut self) {
        self.steps.clear();
    }
}

/// The invoice state machine and side-effect coordinator.
pub struct InvoiceEngine {
    ports: EnginePorts,
}

impl InvoiceEngine {
    pub fn new(ports: EnginePorts) -> Self {
        Self { ports }
    }

    pub fn ports(&self) -> &EnginePorts {
        &self.ports
    }

    /// Create an invoice in state PENDING.
    ///
    /// Steps: validate customer, price items, reserve stock, apply any
    /// discount code, persist, record the purchase on the customer ledger,
    /// then (bank transfer only) attach a payment QR. Every side effect
    /// before persistence has a compensating action; QR generation is
    /// non-fatal.
    pub fn create(&self, request: CreateInvoiceRequest) -> EngineResult<Invoice> {
        let now = Utc::now();
        let mut comp = Compensations::new();
        let mut invoice = match self.create_inner(&request, now, &mut comp) {
            Ok(invoice) => {
                comp.discharge();
                invoice
            }
            Err(e) => {
                comp.unwind();
                return Err(e);
            }
        };

        self.forward_last_audit(&invoice);

        if request.payment_method == PaymentMethod::BankTransfer {
            self.attach_payment_qr(&mut invoice);
        }

        info!(
            invoice_id = %invoice.id,
            invoice_number = %invoice.invoice_number,
            total = %invoice.total,
            "invoice created"
        );
        Ok(invoice)
    }

    fn create_inner(
        &self,
        request: &CreateInvoiceRequest,
        now: DateTime<Utc>,
        comp: &mut Compensations,
    ) -> EngineResult<Invoice> {
        if request.lines.is_empty() {
            return Err(EngineError::validation(
                "invoice must have at least one line",
            ));
        }

        let customer = self.ports.customers.get_active(request.customer_id)?;

        // Price every line up front; nothing is mutated yet.
        let mut lines = Vec::with_capacity(request.lines.len());
        let mut subtotal = Money::ZERO;
        for requested in &request.lines {
            let product = self.ports.catalog.get_active(requested.product_id)?;
            if product.stock < requested.quantity {
                return Err(EngineError::insufficient_stock(product.id));
            }
            let effective = pricing::effective_price(&product, now);
            let line_subtotal = pricing::line_subtotal(effective, requested.quantity)?;
            subtotal = subtotal.checked_add(line_subtotal)?;
            lines.push(LineItem {
                product_id: product.id,
                name: product.name,
                quantity: requested.quantity,
                unit_price: product.base_price,
                effective_price: effective,
                subtotal: line_subtotal,
            });
        }

        let stock_lines: Vec<StockLine> = lines.iter().map(LineItem::as_stock_line).collect();
        self.ports.stock.reserve(&stock_lines)?;
        {
            let stock = Arc::clone(&self.ports.stock);
            let released = stock_lines.clone();
            comp.push("release_stock", move || stock.release(&released));
        }

        let discount = match &request.discount_code {
            Some(code) => Some(self.apply_discount_code(code, subtotal, now, comp)?),
            None => None,
        };
        let discount_amount = discount.as_ref().map(|d| d.amount).unwrap_or(Money::ZERO);
        let total = subtotal.saturating_sub(discount_amount);

        let sequence = self.ports.sequence.next()?;
        let mut invoice = Invoice {
            id: InvoiceId::new(),
            invoice_number: invoice_number(now, sequence),
            customer_id: customer.id,
            lines,
            subtotal,
            discount,
            total,
            payment_method: request.payment_method,
            status: InvoiceStatus::Pending,
            payment: None,
            refund: None,
            payment_qr: None,
            notes: request.notes.clone(),
            effects_reverted: false,
            issued_at: now,
            history: Vec::new(),
        };
        invoice.push_audit(
            request.actor,
            "created",
            json!({
                "invoice_number": invoice.invoice_number,
                "subtotal": invoice.subtotal,
                "discount": invoice.discount_amount(),
                "total": invoice.total,
                "payment_method": invoice.payment_method,
            }),
            now,
        );

        self.ports.invoices.insert(&invoice)?;
        {
            let invoices = Arc::clone(&self.ports.invoices);
            let id = invoice.id;
            comp.push("remove_invoice", move || invoices.remove(id));
        }

        self.ports
            .customers
            .record_purchase(customer.id, invoice.id, now)?;

        Ok(invoice)
    }

    fn apply_discount_code(
        &self,
        code: &str,
        subtotal: Money,
        now: DateTime<Utc>,
        comp: &mut Compensations,
    ) -> EngineResult<AppliedDiscount> {
        let discount = self
            .ports
            .discounts
            .find_by_code(code)?
            .ok_or_else(|| EngineError::not_found(format!("discount code {code}")))?;
        discount.validate(subtotal, now)?;
        let amount = discount.discount_amount(subtotal);

        // The ledger re-checks the limit atomically; validation above can be
        // stale under concurrent creates.
        self.ports.discounts.apply_usage(discount.id)?;
        {
            let discounts = Arc::clone(&self.ports.discounts);
            let id = discount.id;
            comp.push("revert_discount_usage", move || discounts.revert_usage(id));
        }

        Ok(AppliedDiscount {
            discount_id: discount.id,
            code: discount.code.clone(),
            rule: discount.rule.clone(),
            amount,
        })
    }

    /// Validate and execute one state transition, appending exactly one audit
    /// record.
    pub fn transition(
        &self,
        invoice_id: InvoiceId,
        new_status: InvoiceStatus,
        payload: TransitionPayload,
        actor: UserId,
    ) -> EngineResult<Invoice> {
        let now = Utc::now();
        let mut invoice = self.ports.invoices.get(invoice_id)?;
        let from = invoice.status;
        if !from.can_transition_to(new_status) {
            return Err(EngineError::invalid_transition(from, new_status));
        }

        let mut comp = Compensations::new();
        let result =
            self.run_transition(&mut invoice, from, new_status, &payload, actor, now, &mut comp);
        match result {
            Ok(()) => comp.discharge(),
            Err(e) => {
                comp.unwind();
                return Err(e);
            }
        }

        self.forward_last_audit(&invoice);
        info!(
            invoice_id = %invoice.id,
            from = %from,
            to = %new_status,
            "invoice transitioned"
        );
        Ok(invoice)
    }

    fn run_transition(
        &self,
        invoice: &mut Invoice,
        from: InvoiceStatus,
        new_status: InvoiceStatus,
        payload: &TransitionPayload,
        actor: UserId,
        now: DateTime<Utc>,
        comp: &mut Compensations,
    ) -> EngineResult<()> {
        match new_status {
            InvoiceStatus::Confirmed => self.check_lines_still_sellable(invoice)?,
            InvoiceStatus::Paid => {
                let record = self.validate_payment(invoice, payload, now)?;
                invoice.payment = Some(record);
            }
            InvoiceStatus::Completed => {
                let customers = Arc::clone(&self.ports.customers);
                let customer_id = invoice.customer_id;
                let total = invoice.total;
                self.ports
                    .customers
                    .record_completion(customer_id, total, now)?;
                comp.push("revert_completion", move || {
                    customers.revert_completion(customer_id, total)
                });
            }
            InvoiceStatus::Canceled => {
                let reason = payload
                    .reason
                    .as_deref()
                    .filter(|r| !r.trim().is_empty())
                    .ok_or_else(|| EngineError::validation("cancellation requires a reason"))?;
                debug!(invoice_id = %invoice.id, reason, "canceling invoice");
                self.revert_creation_effects(invoice, comp)?;
            }
            InvoiceStatus::Refunded => {
                let request = payload.refund.as_ref().ok_or_else(|| {
                    EngineError::validation("refund requires amount, method and reason")
                })?;
                self.execute_refund(invoice, request, from, now, comp)?;
            }
            // No row in the table leads back to Pending; the table check above
            // already rejected this.
            InvoiceStatus::Pending => {
                return Err(EngineError::invalid_transition(from, new_status));
            }
        }

        invoice.status = new_status;
        invoice.push_audit(
            actor,
            "status_changed",
            json!({
                "from": from,
                "to": new_status,
                "reason": payload.reason,
            }),
            now,
        );
        self.ports.invoices.update(invoice)?;
        Ok(())
    }

    /// CONFIRMED re-validates the lines without mutating anything. The units
    /// themselves were reserved at creation and stay held, so the on-hand
    /// count must not be compared against the invoiced quantity again; what
    /// can still invalidate the invoice is a product being archived or
    /// removed from the catalog in the meantime.
    fn check_lines_still_sellable(&self, invoice: &Invoice) -> EngineResult<()> {
        for line in &invoice.lines {
            self.ports.catalog.get_active(line.product_id)?;
        }
        Ok(())
    }

    fn validate_payment(
        &self,
        invoice: &Invoice,
        payload: &TransitionPayload,
        now: DateTime<Utc>,
    ) -> EngineResult<PaymentRecord> {
        let amount = payload
            .amount_paid
            .ok_or_else(|| EngineError::validation("payment requires an amount"))?;
        if amount != invoice.total {
            return Err(EngineError::validation(format!(
                "payment amount {} must equal invoice total {}",
                amount, invoice.total
            )));
        }

        let transaction_id = match invoice.payment_method {
            PaymentMethod::BankTransfer => {
                let id = payload.transaction_id.as_deref().ok_or_else(|| {
                    EngineError::validation("bank transfer requires a transaction id")
                })?;
                if !is_valid_transaction_id(id) {
                    return Err(EngineError::validation(
                        "transaction id must be 6-20 alphanumeric characters",
                    ));
                }
                Some(id.to_owned())
            }
            PaymentMethod::Cash => None,
        };

        Ok(PaymentRecord {
            method: invoice.payment_method,
            transaction_id,
            amount,
            paid_at: now,
        })
    }

    /// Undo creation-time effects: release stock, revert discount usage,
    /// revert the purchase record. Idempotent via `effects_reverted`.
    fn revert_creation_effects(
        &self,
        invoice: &mut Invoice,
        comp: &mut Compensations,
    ) -> EngineResult<()> {
        if invoice.effects_reverted {
            debug!(invoice_id = %invoice.id, "effects already reverted, skipping");
            return Ok(());
        }

        let stock_lines = invoice.stock_lines();
        self.ports.stock.release(&stock_lines)?;
        {
            let stock = Arc::clone(&self.ports.stock);
            comp.push("re_reserve_stock", move || stock.reserve(&stock_lines));
        }

        if let Some(discount) = &invoice.discount {
            self.ports.discounts.revert_usage(discount.discount_id)?;
            let discounts = Arc::clone(&self.ports.discounts);
            let id = discount.discount_id;
            comp.push("re_apply_discount_usage", move || discounts.apply_usage(id));
        }

        self.ports
            .customers
            .revert_purchase(invoice.customer_id, invoice.id)?;
        {
            let customers = Arc::clone(&self.ports.customers);
            let customer_id = invoice.customer_id;
            let id = invoice.id;
            let at = invoice.issued_at;
            comp.push("re_record_purchase", move || {
                customers.record_purchase(customer_id, id, at)
            });
        }

        invoice.effects_reverted = true;
        Ok(())
    }

    fn execute_refund(
        &self,
        invoice: &mut Invoice,
        request: &RefundRequest,
        from: InvoiceStatus,
        now: DateTime<Utc>,
        comp: &mut Compensations,
    ) -> EngineResult<()> {
        if request.reason.trim().is_empty() {
            return Err(EngineError::validation("refund requires a reason"));
        }
        if request.amount > invoice.total {
            return Err(EngineError::validation(format!(
                "refund amount {} exceeds invoice total {}",
                request.amount, invoice.total
            )));
        }

        match &request.lines {
            Some(lines) => self.partial_refund(invoice, request, lines.clone(), now, comp)?,
            None => self.full_refund(invoice, request, from, now, comp)?,
        }
        Ok(())
    }

    /// Partial refund by item list: restore only the listed units; the
    /// computed amount must match the requested one exactly.
    fn partial_refund(
        &self,
        invoice: &mut Invoice,
        request: &RefundRequest,
        lines: Vec<StockLine>,
        now: DateTime<Utc>,
        comp: &mut Compensations,
    ) -> EngineResult<()> {
        let mut computed = Money::ZERO;
        let mut seen: Vec<ProductId> = Vec::with_capacity(lines.len());
        for refund_line in &lines {
            if seen.contains(&refund_line.product_id) {
                return Err(EngineError::validation(format!(
                    "product {} listed twice in refund",
                    refund_line.product_id
                )));
            }
            seen.push(refund_line.product_id);
            let original = invoice
                .lines
                .iter()
                .find(|l| l.product_id == refund_line.product_id)
                .ok_or_else(|| {
                    EngineError::validation(format!(
                        "product {} is not on this invoice",
                        refund_line.product_id
                    ))
                })?;
            if refund_line.quantity > original.quantity {
                return Err(EngineError::validation(format!(
                    "refund quantity {} exceeds invoiced quantity {} for product {}",
                    refund_line.quantity, original.quantity, original.product_id
                )));
            }
            let line_amount = original.effective_price.checked_mul(refund_line.quantity)?;
            computed = computed.checked_add(line_amount)?;
        }
        if computed != request.amount {
            return Err(EngineError::RefundAmountMismatch {
                requested: request.amount,
                computed,
            });
        }

        self.ports.stock.release(&lines)?;
        {
            let stock = Arc::clone(&self.ports.stock);
            let released = lines.clone();
            comp.push("re_reserve_stock", move || stock.reserve(&released));
        }

        invoice.refund = Some(RefundRecord {
            amount: request.amount,
            method: request.method,
            reason: request.reason.clone(),
            lines: Some(lines),
            refunded_at: now,
        });
        Ok(())
    }

    /// Full refund: restore all stock, revert discount usage, and undo the
    /// completion contribution when the invoice had reached COMPLETED.
    fn full_refund(
        &self,
        invoice: &mut Invoice,
        request: &RefundRequest,
        from: InvoiceStatus,
        now: DateTime<Utc>,
        comp: &mut Compensations,
    ) -> EngineResult<()> {
        if !invoice.effects_reverted {
            let stock_lines = invoice.stock_lines();
            self.ports.stock.release(&stock_lines)?;
            {
                let stock = Arc::clone(&self.ports.stock);
                comp.push("re_reserve_stock", move || stock.reserve(&stock_lines));
            }

            if let Some(discount) = &invoice.discount {
                self.ports.discounts.revert_usage(discount.discount_id)?;
                let discounts = Arc::clone(&self.ports.discounts);
                let id = discount.discount_id;
                comp.push("re_apply_discount_usage", move || discounts.apply_usage(id));
            }

            invoice.effects_reverted = true;
        }

        if from == InvoiceStatus::Completed {
            self.ports
                .customers
                .revert_completion(invoice.customer_id, invoice.total)?;
            let customers = Arc::clone(&self.ports.customers);
            let customer_id = invoice.customer_id;
            let total = invoice.total;
            comp.push("re_record_completion", move || {
                customers.record_completion(customer_id, total, now)
            });
        }

        invoice.refund = Some(RefundRecord {
            amount: request.amount,
            method: request.method,
            reason: request.reason.clone(),
            lines: None,
            refunded_at: now,
        });
        Ok(())
    }

    /// Reduced three-state view for callers still on the simple payment
    /// model. `paid` walks the canonical states forward; `cancelled` runs the
    /// CANCELED handler. No update is allowed once an invoice is canceled.
    pub fn update_payment_status(
        &self,
        invoice_id: InvoiceId,
        target: PaymentStatus,
        payload: TransitionPayload,
        actor: UserId,
    ) -> EngineResult<Invoice> {
        let invoice = self.ports.invoices.get(invoice_id)?;
        if invoice.status == InvoiceStatus::Canceled {
            return Err(EngineError::validation(
                "cannot update a canceled invoice",
            ));
        }

        match target {
            PaymentStatus::Pending => Err(EngineError::validation(
                "cannot move an invoice back to pending",
            )),
            PaymentStatus::Paid => {
                let mut current = invoice;
                if current.status == InvoiceStatus::Pending {
                    current = self.transition(
                        invoice_id,
                        InvoiceStatus::Confirmed,
                        TransitionPayload::empty(),
                        actor,
                    )?;
                }
                if current.status != InvoiceStatus::Confirmed {
                    return Err(EngineError::invalid_transition(current.status, "paid"));
                }
                self.transition(invoice_id, InvoiceStatus::Paid, payload, actor)
            }
            PaymentStatus::Cancelled => {
                let payload = if payload.reason.is_some() {
                    payload
                } else {
                    TransitionPayload {
                        reason: Some("cancelled via payment status update".into()),
                        ..payload
                    }
                };
                self.transition(invoice_id, InvoiceStatus::Canceled, payload, actor)
            }
        }
    }

    /// Revenue/product/payment-method statistics over PAID and COMPLETED
    /// invoices issued in `range`.
    pub fn statistics(&self, range: DateRange) -> EngineResult<InvoiceStatistics> {
        let invoices = self.ports.invoices.list()?;
        Ok(compute_statistics(&invoices, range))
    }

    fn attach_payment_qr(&self, invoice: &mut Invoice) {
        let bank = match self.ports.store_profile.bank_profile() {
            Ok(bank) => bank,
            Err(e) => {
                warn!(invoice_id = %invoice.id, error = %e, "no bank profile, skipping payment QR");
                return;
            }
        };
        match self.ports.payment_qr.generate(invoice, &bank) {
            Ok(url) => {
                invoice.payment_qr = Some(url);
                if let Err(e) = self.ports.invoices.update(invoice) {
                    warn!(invoice_id = %invoice.id, error = %e, "failed to persist payment QR");
                }
            }
            Err(e) => {
                // Non-fatal: the QR can be regenerated later.
                warn!(invoice_id = %invoice.id, error = %e, "payment QR generation failed");
            }
        }
    }

    fn forward_last_audit(&self, invoice: &Invoice) {
        let Some(record) = invoice.history.last() else {
            return;
        };
        let entry = AuditEntry {
            invoice_id: invoice.id,
            record: record.clone(),
        };
        if let Err(e) = self.ports.audit.record(&entry) {
            warn!(invoice_id = %invoice.id, error = %e, "audit sink rejected entry");
        }
    }
}
