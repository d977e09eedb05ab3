use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mercato_core::{EngineResult, Entity, Money, ProductId};

/// Product status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Draft,
    Active,
    Archived,
}

/// Time-bounded percentage discount attached to a product.
///
/// Managed by catalog CRUD (outside this engine); the engine only reads it
/// when pricing invoice lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDiscount {
    /// Percentage off the base price, 0..=100.
    pub percentage: u8,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub active: bool,
}

impl ProductDiscount {
    /// Whether this discount applies at `as_of`.
    pub fn applies_at(&self, as_of: DateTime<Utc>) -> bool {
        self.active && self.starts_at <= as_of && as_of <= self.ends_at
    }
}

/// A catalog product as the invoice engine sees it.
///
/// The engine never mutates a product except for its stock quantity, and that
/// only through the inventory ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub sku: String,
    pub name: String,
    pub status: ProductStatus,
    /// Price in smallest currency unit (e.g., cents).
    pub base_price: Money,
    /// On-hand stock, mutated only via the inventory ledger.
    pub stock: u64,
    pub discount: Option<ProductDiscount>,
}

impl Product {
    /// Check if product can be sold (must be Active, not Archived).
    pub fn can_be_sold(&self) -> bool {
        self.status == ProductStatus::Active
    }
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// Read-side catalog lookup used by the invoice engine.
pub trait ProductCatalog: Send + Sync {
    /// Fetch a product that exists and is sellable.
    ///
    /// Returns `NotFound` when the product is missing, draft, or archived.
    fn get_active(&self, id: ProductId) -> EngineResult<Product>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn product(status: ProductStatus) -> Product {
        Product {
            id: ProductId::new(),
            sku: "SKU-1".into(),
            name: "Widget".into(),
            status,
            base_price: Money::from_minor(1000),
            stock: 10,
            discount: None,
        }
    }

    #[test]
    fn only_active_products_are_sellable() {
        assert!(product(ProductStatus::Active).can_be_sold());
        assert!(!product(ProductStatus::Draft).can_be_sold());
        assert!(!product(ProductStatus::Archived).can_be_sold());
    }

    #[test]
    fn discount_window_is_inclusive() {
        let now = Utc::now();
        let d = ProductDiscount {
            percentage: 20,
            starts_at: now,
            ends_at: now + Duration::days(7),
            active: true,
        };
        assert!(d.applies_at(now));
        assert!(d.applies_at(now + Duration::days(7)));
        assert!(!d.applies_at(now - Duration::seconds(1)));
        assert!(!d.applies_at(now + Duration::days(8)));
    }

    #[test]
    fn inactive_discount_never_applies() {
        let now = Utc::now();
        let d = ProductDiscount {
            percentage: 20,
            starts_at: now - Duration::days(1),
            ends_at: now + Duration::days(1),
            active: false,
        };
        assert!(!d.applies_at(now));
    }
}
