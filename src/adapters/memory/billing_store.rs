//! In-memory BillingStore for tests and local runs.
//!
//! A transaction holds the store's async mutex for its whole lifetime, so
//! transactions are fully serialized. Writes are staged on the transaction
//! and applied to the shared state only on `commit`; dropping the
//! transaction discards them.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::domain::billing::{
    CanonicalEvent, EntitlementProjection, EventId, IdempotencyKey, LedgerEvent, ProductKey,
    Provider,
};
use crate::domain::foundation::{DomainError, UserId};
use crate::ports::{BillingStore, InsertOutcome, LedgerTransaction};

type ProjectionKey = (UserId, ProductKey);

#[derive(Default)]
struct MemoryState {
    events: Vec<LedgerEvent>,
    entitlements: HashMap<ProjectionKey, EntitlementProjection>,
    last_sequence: i64,
}

/// In-memory implementation of the BillingStore port.
#[derive(Clone, Default)]
pub struct InMemoryBillingStore {
    state: Arc<AsyncMutex<MemoryState>>,
    upsert_failures: Arc<Mutex<VecDeque<DomainError>>>,
}

impl InMemoryBillingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes an upcoming `upsert_projection` call fail with `error`.
    /// Queued failures are consumed one per call, oldest first.
    pub fn fail_next_upsert(&self, error: DomainError) {
        self.upsert_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(error);
    }

    /// Number of committed ledger rows.
    pub async fn event_count(&self) -> usize {
        self.state.lock().await.events.len()
    }

    /// All committed ledger rows in insertion order.
    pub async fn all_events(&self) -> Vec<LedgerEvent> {
        self.state.lock().await.events.clone()
    }
}

/// Open in-memory transaction.
pub struct InMemoryLedgerTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    staged_events: Vec<LedgerEvent>,
    staged_entitlements: HashMap<ProjectionKey, EntitlementProjection>,
    upsert_failures: Arc<Mutex<VecDeque<DomainError>>>,
}

impl InMemoryLedgerTransaction {
    fn visible_events(&self) -> impl Iterator<Item = &LedgerEvent> {
        self.guard.events.iter().chain(self.staged_events.iter())
    }

    fn find_event(&self, predicate: impl Fn(&CanonicalEvent) -> bool) -> Option<LedgerEvent> {
        self.visible_events().find(|e| predicate(&e.event)).cloned()
    }

    fn conflicts(&self, event: &CanonicalEvent) -> bool {
        self.visible_events().any(|existing| {
            let e = &existing.event;
            e.event_id == event.event_id
                || (event.provider_event_id.is_some()
                    && e.provider == event.provider
                    && e.provider_event_id == event.provider_event_id)
                || (event.idempotency_key.is_some() && e.idempotency_key == event.idempotency_key)
        })
    }

    fn visible_projection(&self, key: &ProjectionKey) -> Option<&EntitlementProjection> {
        self.staged_entitlements
            .get(key)
            .or_else(|| self.guard.entitlements.get(key))
    }
}

#[async_trait]
impl BillingStore for InMemoryBillingStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>, DomainError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        Ok(Box::new(InMemoryLedgerTransaction {
            guard,
            staged_events: Vec::new(),
            staged_entitlements: HashMap::new(),
            upsert_failures: Arc::clone(&self.upsert_failures),
        }))
    }

    async fn find_entitlement(
        &self,
        user_id: &UserId,
        product_key: ProductKey,
    ) -> Result<Option<EntitlementProjection>, DomainError> {
        let state = self.state.lock().await;
        Ok(state
            .entitlements
            .get(&(user_id.clone(), product_key))
            .cloned())
    }

    async fn list_events(
        &self,
        user_id: &UserId,
        product_key: ProductKey,
    ) -> Result<Vec<LedgerEvent>, DomainError> {
        let state = self.state.lock().await;
        let mut events: Vec<LedgerEvent> = state
            .events
            .iter()
            .filter(|e| &e.event.user_id == user_id && e.event.product_key == product_key)
            .cloned()
            .collect();
        events.sort_by(|a, b| {
            a.event
                .received_at
                .cmp(&b.event.received_at)
                .then(a.sequence.cmp(&b.sequence))
        });
        Ok(events)
    }
}

#[async_trait]
impl LedgerTransaction for InMemoryLedgerTransaction {
    async fn find_by_event_id(
        &mut self,
        event_id: &EventId,
    ) -> Result<Option<LedgerEvent>, DomainError> {
        Ok(self.find_event(|e| &e.event_id == event_id))
    }

    async fn find_by_provider_event_id(
        &mut self,
        provider: Provider,
        provider_event_id: &str,
    ) -> Result<Option<LedgerEvent>, DomainError> {
        Ok(self.find_event(|e| {
            e.provider == provider && e.provider_event_id.as_deref() == Some(provider_event_id)
        }))
    }

    async fn find_by_idempotency_key(
        &mut self,
        key: &IdempotencyKey,
    ) -> Result<Option<LedgerEvent>, DomainError> {
        Ok(self.find_event(|e| e.idempotency_key.as_ref() == Some(key)))
    }

    async fn insert_event(
        &mut self,
        event: &CanonicalEvent,
        signature_verified: bool,
    ) -> Result<InsertOutcome, DomainError> {
        if self.conflicts(event) {
            return Ok(InsertOutcome::AlreadyExists);
        }

        let sequence = self.guard.last_sequence + self.staged_events.len() as i64 + 1;
        let row = LedgerEvent {
            event: event.clone(),
            signature_verified,
            sequence,
        };
        self.staged_events.push(row.clone());
        Ok(InsertOutcome::Inserted(row))
    }

    async fn find_projection_for_update(
        &mut self,
        user_id: &UserId,
        product_key: ProductKey,
    ) -> Result<Option<EntitlementProjection>, DomainError> {
        Ok(self
            .visible_projection(&(user_id.clone(), product_key))
            .cloned())
    }

    async fn upsert_projection(
        &mut self,
        projection: &EntitlementProjection,
        expected_version: i64,
    ) -> Result<(), DomainError> {
        let injected = self
            .upsert_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        if let Some(error) = injected {
            return Err(error);
        }

        let key = (projection.user_id.clone(), projection.product_key);
        let stored_version = self.visible_projection(&key).map_or(0, |p| p.version);
        if stored_version != expected_version {
            return Err(DomainError::concurrent_modification(format!(
                "Entitlement {}/{} is at version {}, expected {}",
                projection.user_id, projection.product_key, stored_version, expected_version
            )));
        }

        self.staged_entitlements.insert(key, projection.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        let InMemoryLedgerTransaction {
            mut guard,
            staged_events,
            staged_entitlements,
            ..
        } = *self;

        if let Some(last) = staged_events.last() {
            guard.last_sequence = last.sequence;
        }
        guard.events.extend(staged_events);
        guard.entitlements.extend(staged_entitlements);
        Ok(())
    }
}
