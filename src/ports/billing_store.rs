//! BillingStore port - Transactional access to the ledger and projections.
//!
//! A ledger append and its projection update must land together or not at
//! all. The port therefore hands out a [`LedgerTransaction`]: every read and
//! write goes through it, `commit` makes them durable, and dropping it
//! without committing rolls everything back.
//!
//! ## Uniqueness
//!
//! Implementations enforce uniqueness of `event_id`,
//! `(provider, provider_event_id)` and `idempotency_key` at the storage
//! level, so two concurrent inserts of the same fact cannot both succeed.

use async_trait::async_trait;

use crate::domain::billing::{
    CanonicalEvent, EntitlementProjection, EventId, IdempotencyKey, LedgerEvent, ProductKey,
    Provider,
};
use crate::domain::foundation::{DomainError, UserId};

/// Result of attempting to insert a ledger event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Row was written.
    Inserted(LedgerEvent),
    /// A uniqueness constraint fired; another writer got there first.
    AlreadyExists,
}

/// Port for opening ledger transactions and reading committed state.
#[async_trait]
pub trait BillingStore: Send + Sync {
    /// Opens a transaction.
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>, DomainError>;

    /// Reads the committed projection for a user and product.
    async fn find_entitlement(
        &self,
        user_id: &UserId,
        product_key: ProductKey,
    ) -> Result<Option<EntitlementProjection>, DomainError>;

    /// Lists the ledger for a user and product in replay order
    /// (`received_at`, then insertion sequence).
    async fn list_events(
        &self,
        user_id: &UserId,
        product_key: ProductKey,
    ) -> Result<Vec<LedgerEvent>, DomainError>;
}

/// A unit of work against the ledger.
///
/// Dropping a transaction without calling [`commit`](Self::commit) discards
/// every write made through it.
#[async_trait]
pub trait LedgerTransaction: Send {
    async fn find_by_event_id(
        &mut self,
        event_id: &EventId,
    ) -> Result<Option<LedgerEvent>, DomainError>;

    async fn find_by_provider_event_id(
        &mut self,
        provider: Provider,
        provider_event_id: &str,
    ) -> Result<Option<LedgerEvent>, DomainError>;

    async fn find_by_idempotency_key(
        &mut self,
        key: &IdempotencyKey,
    ) -> Result<Option<LedgerEvent>, DomainError>;

    /// Appends an event. Never updates an existing row.
    async fn insert_event(
        &mut self,
        event: &CanonicalEvent,
        signature_verified: bool,
    ) -> Result<InsertOutcome, DomainError>;

    /// Loads the projection and locks it until the transaction ends.
    async fn find_projection_for_update(
        &mut self,
        user_id: &UserId,
        product_key: ProductKey,
    ) -> Result<Option<EntitlementProjection>, DomainError>;

    /// Writes the projection if the stored version still equals
    /// `expected_version` (0 means "no row yet").
    ///
    /// Returns a `ConcurrentModification` error otherwise.
    async fn upsert_projection(
        &mut self,
        projection: &EntitlementProjection,
        expected_version: i64,
    ) -> Result<(), DomainError>;

    /// Makes every write in this transaction durable.
    async fn commit(self: Box<Self>) -> Result<(), DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn billing_store_is_object_safe() {
        fn _accepts_dyn(_store: &dyn BillingStore) {}
    }

    #[test]
    fn ledger_transaction_is_object_safe() {
        fn _accepts_box(_tx: Box<dyn LedgerTransaction>) {}
    }
}
