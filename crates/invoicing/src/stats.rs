//! Invoice statistics: daily revenue, top products, payment-method breakdown.
//!
//! Only PAID and COMPLETED invoices count as revenue; canceled and refunded
//! invoices are excluded, pending/confirmed ones have not been paid yet.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use mercato_core::{Money, ProductId};

use crate::invoice::{Invoice, InvoiceStatus, PaymentMethod};

/// How many products the top-products list carries.
const TOP_PRODUCTS_LIMIT: usize = 5;

/// Half-open is deliberately avoided: both bounds are inclusive, matching the
/// audit-facing reports this feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl DateRange {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from <= at && at <= self.to
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyRevenue {
    pub date: NaiveDate,
    pub revenue: Money,
    pub invoices: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSales {
    pub product_id: ProductId,
    pub name: String,
    pub quantity: u64,
    pub revenue: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethodBreakdown {
    pub method: PaymentMethod,
    pub invoices: u64,
    pub revenue: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceStatistics {
    /// Ascending by date.
    pub daily_revenue: Vec<DailyRevenue>,
    /// Descending by quantity sold, at most [`TOP_PRODUCTS_LIMIT`] entries.
    pub top_products: Vec<ProductSales>,
    pub payment_methods: Vec<PaymentMethodBreakdown>,
}

fn counts_as_revenue(status: InvoiceStatus) -> bool {
    matches!(status, InvoiceStatus::Paid | InvoiceStatus::Completed)
}

pub fn compute_statistics(invoices: &[Invoice], range: DateRange) -> InvoiceStatistics {
    let in_range: Vec<&Invoice> = invoices
        .iter()
        .filter(|i| counts_as_revenue(i.status) && range.contains(i.issued_at))
        .collect();

    let mut daily: BTreeMap<NaiveDate, (Money, u64)> = BTreeMap::new();
    let mut products: BTreeMap<ProductId, ProductSales> = BTreeMap::new();
    let mut methods: BTreeMap<PaymentMethod, (u64, Money)> = BTreeMap::new();

    for invoice in &in_range {
        let day = invoice.issued_at.date_naive();
        let entry = daily.entry(day).or_insert((Money::ZERO, 0));
        entry.0 = entry.0.saturating_add(invoice.total);
        entry.1 += 1;

        for line in &invoice.lines {
            let sales = products.entry(line.product_id).or_insert(ProductSales {
                product_id: line.product_id,
                name: line.name.clone(),
                quantity: 0,
                revenue: Money::ZERO,
            });
            sales.quantity += line.quantity;
            sales.revenue = sales.revenue.saturating_add(line.subtotal);
        }

        let m = methods
            .entry(invoice.payment_method)
            .or_insert((0, Money::ZERO));
        m.0 += 1;
        m.1 = m.1.saturating_add(invoice.total);
    }

    let daily_revenue = daily
        .into_iter()
        .map(|(date, (revenue, invoices))| DailyRevenue {
            date,
            revenue,
            invoices,
        })
        .collect();

    let mut top_products: Vec<ProductSales> = products.into_values().collect();
    top_products.sort_by(|a, b| b.quantity.cmp(&a.quantity).then(b.revenue.cmp(&a.revenue)));
    top_products.truncate(TOP_PRODUCTS_LIMIT);

    let payment_methods = methods
        .into_iter()
        .map(|(method, (invoices, revenue))| PaymentMethodBreakdown {
            method,
            invoices,
            revenue,
        })
        .collect();

    InvoiceStatistics {
        daily_revenue,
        top_products,
        payment_methods,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    use mercato_core::{CustomerId, InvoiceId};

    use crate::invoice::LineItem;

    fn invoice(
        status: InvoiceStatus,
        method: PaymentMethod,
        total_minor: u64,
        issued_at: DateTime<Utc>,
        lines: Vec<LineItem>,
    ) -> Invoice {
        Invoice {
            id: InvoiceId::new(),
            invoice_number: "INV2501000001".into(),
            customer_id: CustomerId::new(),
            lines,
            subtotal: Money::from_minor(total_minor),
            discount: None,
            total: Money::from_minor(total_minor),
            payment_method: method,
            status,
            payment: None,
            refund: None,
            payment_qr: None,
            notes: None,
            effects_reverted: false,
            issued_at,
            history: Vec::new(),
        }
    }

    fn line(product_id: ProductId, name: &str, quantity: u64, price_minor: u64) -> LineItem {
        let price = Money::from_minor(price_minor);
        LineItem {
            product_id,
            name: name.into(),
            quantity,
            unit_price: price,
            effective_price: price,
            subtotal: price.checked_mul(quantity).unwrap(),
        }
    }

    #[test]
    fn statistics_cover_revenue_products_and_methods() {
        let day1 = Utc.with_ymd_and_hms(2025, 5, 1, 10, 0, 0).unwrap();
        let day2 = Utc.with_ymd_and_hms(2025, 5, 2, 10, 0, 0).unwrap();
        let widget = ProductId::new();
        let gadget = ProductId::new();

        let invoices = vec![
            invoice(
                InvoiceStatus::Paid,
                PaymentMethod::Cash,
                3000,
                day1,
                vec![line(widget, "Widget", 3, 1000)],
            ),
            invoice(
                InvoiceStatus::Completed,
                PaymentMethod::BankTransfer,
                5000,
                day1,
                vec![line(gadget, "Gadget", 1, 5000)],
            ),
            invoice(
                InvoiceStatus::Paid,
                PaymentMethod::Cash,
                2000,
                day2,
                vec![line(widget, "Widget", 2, 1000)],
            ),
            // Excluded: not revenue.
            invoice(
                InvoiceStatus::Canceled,
                PaymentMethod::Cash,
                9999,
                day1,
                vec![line(widget, "Widget", 9, 1111)],
            ),
        ];

        let range = DateRange::new(day1 - Duration::days(1), day2 + Duration::days(1));
        let stats = compute_statistics(&invoices, range);

        assert_eq!(stats.daily_revenue.len(), 2);
        assert_eq!(stats.daily_revenue[0].date, day1.date_naive());
        assert_eq!(stats.daily_revenue[0].revenue, Money::from_minor(8000));
        assert_eq!(stats.daily_revenue[0].invoices, 2);
        assert_eq!(stats.daily_revenue[1].revenue, Money::from_minor(2000));

        assert_eq!(stats.top_products[0].product_id, widget);
        assert_eq!(stats.top_products[0].quantity, 5);
        assert_eq!(stats.top_products[1].product_id, gadget);

        let cash = stats
            .payment_methods
            .iter()
            .find(|m| m.method == PaymentMethod::Cash)
            .unwrap();
        assert_eq!(cash.invoices, 2);
        assert_eq!(cash.revenue, Money::from_minor(5000));
    }

    #[test]
    fn statistics_respect_the_range() {
        let day = Utc.with_ymd_and_hms(2025, 5, 1, 10, 0, 0).unwrap();
        let invoices = vec![invoice(
            InvoiceStatus::Paid,
            PaymentMethod::Cash,
            3000,
            day,
            vec![],
        )];

        let outside = DateRange::new(day + Duration::days(1), day + Duration::days(2));
        let stats = compute_statistics(&invoices, outside);
        assert!(stats.daily_revenue.is_empty());
        assert!(stats.top_products.is_empty());
        assert!(stats.payment_methods.is_empty());
    }
}
