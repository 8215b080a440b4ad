//! AppendAndProjectHandler - Appends a canonical event and updates the
//! entitlement projection in one transaction.

use std::sync::Arc;

use crate::domain::billing::{
    projector, BillingError, CanonicalEvent, EntitlementProjection, LedgerEvent,
};
use crate::domain::foundation::DomainError;
use crate::ports::{BillingLogEntry, BillingLogSink, BillingStore, InsertOutcome, LedgerTransaction};

/// Which uniqueness key identified an event as already recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupeReason {
    EventId,
    ProviderEventId,
    IdempotencyKey,
}

impl DedupeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DedupeReason::EventId => "event_id",
            DedupeReason::ProviderEventId => "provider_event_id",
            DedupeReason::IdempotencyKey => "idempotency_key",
        }
    }
}

/// Result of appending one event.
#[derive(Debug, Clone)]
pub struct AppendResult {
    /// False when the event was already in the ledger.
    pub appended: bool,
    pub dedupe_reason: Option<DedupeReason>,
    /// The stored row: the new one, or the one that was already there.
    pub ledger_event: LedgerEvent,
    /// Projection after the append (or the current one for duplicates).
    pub projection: EntitlementProjection,
}

/// Handler that owns the ledger write path.
///
/// Every other write (webhooks, checkout, restore) funnels through here so
/// deduplication and projection happen exactly once per fact.
pub struct AppendAndProjectHandler {
    store: Arc<dyn BillingStore>,
    log: Arc<dyn BillingLogSink>,
}

impl AppendAndProjectHandler {
    pub fn new(store: Arc<dyn BillingStore>, log: Arc<dyn BillingLogSink>) -> Self {
        Self { store, log }
    }

    pub async fn handle(
        &self,
        event: CanonicalEvent,
        signature_verified: bool,
    ) -> Result<AppendResult, BillingError> {
        // Validate before touching storage
        event.validate()?;

        // A version conflict means another writer moved the projection
        // between our read and write; one fresh attempt rebuilds on top of it.
        match self.append(event.clone(), signature_verified).await {
            Err(BillingError::ConcurrentModification(reason)) => {
                self.log.record(
                    BillingLogEntry::warn("projection_conflict_retry")
                        .with_field("event_id", &event.event_id)
                        .with_field("reason", &reason),
                );
                self.append(event, signature_verified).await
            }
            result => result,
        }
    }

    async fn append(
        &self,
        mut event: CanonicalEvent,
        signature_verified: bool,
    ) -> Result<AppendResult, BillingError> {
        // 1. Lock the projection; every writer for this user and product
        //    queues here
        let mut tx = self.store.begin().await?;
        let current = current_projection(&mut *tx, &event).await?;

        // 2. Look for an existing copy
        if let Some((existing, reason)) = find_duplicate(&mut *tx, &event).await? {
            self.log_duplicate(&event, reason);
            return Ok(AppendResult {
                appended: false,
                dedupe_reason: Some(reason),
                ledger_event: existing,
                projection: current,
            });
        }

        // 3. Replay order is received_at, so a row may never sort before the
        //    last event already folded into the projection
        if let Some(last) = current.updated_at {
            if event.received_at.is_before(&last) {
                event.received_at = last;
            }
        }

        // 4. Append; a lost race means another writer recorded it first
        let ledger_event = match tx.insert_event(&event, signature_verified).await? {
            InsertOutcome::Inserted(row) => row,
            InsertOutcome::AlreadyExists => {
                drop(tx);
                return self.read_winner(&event).await;
            }
        };

        // 5. Project under the lock
        let next = match projector::apply(&current, &event) {
            Ok(next) => next,
            Err(err) => {
                self.log.record(
                    BillingLogEntry::error("projection_rejected")
                        .with_field("event_id", &event.event_id)
                        .with_field("error", &err),
                );
                return Err(err);
            }
        };

        if let Err(err) = tx.upsert_projection(&next, current.version).await {
            self.log.record(
                BillingLogEntry::warn("projection_write_failed")
                    .with_field("event_id", &event.event_id)
                    .with_field("expected_version", current.version)
                    .with_field("error", &err),
            );
            return Err(err.into());
        }

        // 6. Commit
        tx.commit().await?;

        self.log.record(
            BillingLogEntry::info("event_appended")
                .with_field("event_id", &event.event_id)
                .with_field("event_type", event.event_type())
                .with_field("user_id", &event.user_id)
                .with_field("product_key", event.product_key)
                .with_field("sequence", ledger_event.sequence)
                .with_field("status", next.status)
                .with_field("version", next.version),
        );

        Ok(AppendResult {
            appended: true,
            dedupe_reason: None,
            ledger_event,
            projection: next,
        })
    }

    /// Re-reads the row that won a concurrent insert.
    async fn read_winner(&self, event: &CanonicalEvent) -> Result<AppendResult, BillingError> {
        let mut tx = self.store.begin().await?;
        let (existing, reason) = find_duplicate(&mut *tx, event).await?.ok_or_else(|| {
            BillingError::Storage(format!(
                "insert of {} conflicted but no existing row was found",
                event.event_id
            ))
        })?;
        let projection = current_projection(&mut *tx, event).await?;
        self.log_duplicate(event, reason);

        Ok(AppendResult {
            appended: false,
            dedupe_reason: Some(reason),
            ledger_event: existing,
            projection,
        })
    }

    fn log_duplicate(&self, event: &CanonicalEvent, reason: DedupeReason) {
        self.log.record(
            BillingLogEntry::info("event_deduplicated")
                .with_field("event_id", &event.event_id)
                .with_field("event_type", event.event_type())
                .with_field("reason", reason.as_str()),
        );
    }
}

/// Checks the three uniqueness keys in order.
async fn find_duplicate(
    tx: &mut dyn LedgerTransaction,
    event: &CanonicalEvent,
) -> Result<Option<(LedgerEvent, DedupeReason)>, DomainError> {
    if let Some(existing) = tx.find_by_event_id(&event.event_id).await? {
        return Ok(Some((existing, DedupeReason::EventId)));
    }
    if let Some(provider_event_id) = event.provider_event_id.as_deref() {
        if let Some(existing) = tx
            .find_by_provider_event_id(event.provider, provider_event_id)
            .await?
        {
            return Ok(Some((existing, DedupeReason::ProviderEventId)));
        }
    }
    if let Some(key) = event.idempotency_key.as_ref() {
        if let Some(existing) = tx.find_by_idempotency_key(key).await? {
            return Ok(Some((existing, DedupeReason::IdempotencyKey)));
        }
    }
    Ok(None)
}

async fn current_projection(
    tx: &mut dyn LedgerTransaction,
    event: &CanonicalEvent,
) -> Result<EntitlementProjection, DomainError> {
    Ok(tx
        .find_projection_for_update(&event.user_id, event.product_key)
        .await?
        .unwrap_or_else(|| EntitlementProjection::empty(event.user_id.clone(), event.product_key)))
}
