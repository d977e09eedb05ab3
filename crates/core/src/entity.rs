//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Domain records (products, customers, discount codes, invoices) implement
/// this so generic store code can key them uniformly.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Copy + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> Self::Id;
}
