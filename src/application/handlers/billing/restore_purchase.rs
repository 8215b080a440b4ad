//! RestorePurchaseHandler - Re-grants an entitlement from the provider's records.
//!
//! Used when a webhook was lost or a user reinstalls: the provider is asked
//! for the newest completed purchase and, if one exists, a
//! `restore_succeeded` event is recorded. The event id is derived from the
//! provider's checkout session so restoring the same purchase twice writes
//! only one grant. A failed attempt is keyed by the request's idempotency
//! key, so retrying the same request records at most one failure.

use std::sync::Arc;

use super::append_and_project::AppendAndProjectHandler;
use crate::domain::billing::{
    build_command_dedupe_key, BillingError, CanonicalEvent, EntitlementProjection, EventId,
    EventPayload, EventType, IdempotencyKey, ProductKey, Provider, RestoreOrigin,
};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::{BillingLogEntry, BillingLogSink, BillingProvider, BillingStore, CompletedPurchase};

/// Command to restore a purchase.
#[derive(Debug, Clone)]
pub struct RestorePurchaseCommand {
    pub user_id: UserId,
    pub product_key: ProductKey,
    pub origin: RestoreOrigin,
    /// Client-supplied key for the `restore_requested` row.
    pub idempotency_key: String,
}

/// Result of a restore attempt.
#[derive(Debug, Clone)]
pub struct RestorePurchaseResult {
    /// True when the provider reported a completed purchase.
    pub restored: bool,
    pub purchase: Option<CompletedPurchase>,
    /// Projection after the attempt.
    pub projection: EntitlementProjection,
}

/// Reason recorded when the provider has no matching purchase.
pub const NO_PURCHASE_FOUND: &str = "no_completed_purchase";

/// Handler for restore requests.
pub struct RestorePurchaseHandler {
    provider: Arc<dyn BillingProvider>,
    appender: AppendAndProjectHandler,
    log: Arc<dyn BillingLogSink>,
}

impl RestorePurchaseHandler {
    pub fn new(
        provider: Arc<dyn BillingProvider>,
        store: Arc<dyn BillingStore>,
        log: Arc<dyn BillingLogSink>,
    ) -> Self {
        Self {
            provider,
            appender: AppendAndProjectHandler::new(store, Arc::clone(&log)),
            log,
        }
    }

    pub async fn handle(
        &self,
        cmd: RestorePurchaseCommand,
    ) -> Result<RestorePurchaseResult, BillingError> {
        let provider = self.provider.provider();
        let key = build_command_dedupe_key(&cmd.idempotency_key)?;

        // 1. Record the request
        let requested = command_event(
            &cmd,
            provider,
            Some(key.clone()),
            EventPayload::RestoreRequested { origin: cmd.origin },
        );
        self.appender.handle(requested, false).await?;

        // 2. Ask the provider
        let lookup = self
            .provider
            .find_completed_purchase(&cmd.user_id, cmd.product_key)
            .await;

        let purchase = match lookup {
            Ok(Some(purchase)) => purchase,
            Ok(None) => {
                let failed = self
                    .record_failure(&cmd, provider, &key, NO_PURCHASE_FOUND)
                    .await?;
                return Ok(RestorePurchaseResult {
                    restored: false,
                    purchase: None,
                    projection: failed,
                });
            }
            Err(err) => {
                self.log.record(
                    BillingLogEntry::error("restore_lookup_failed")
                        .with_field("user_id", &cmd.user_id)
                        .with_field("product_key", cmd.product_key)
                        .with_field("error", &err),
                );
                let reason = format!("provider_error: {}", err.code);
                self.record_failure(&cmd, provider, &key, &reason).await?;
                return Err(BillingError::Provider(err));
            }
        };

        // 3. Record the grant
        let succeeded = restore_succeeded(&cmd, provider, &purchase)?;
        let append = self.appender.handle(succeeded, false).await?;

        Ok(RestorePurchaseResult {
            restored: true,
            purchase: Some(purchase),
            projection: append.projection,
        })
    }

    async fn record_failure(
        &self,
        cmd: &RestorePurchaseCommand,
        provider: Provider,
        key: &IdempotencyKey,
        reason: &str,
    ) -> Result<EntitlementProjection, BillingError> {
        let mut failed = command_event(
            cmd,
            provider,
            None,
            EventPayload::RestoreFailed {
                origin: cmd.origin,
                reason: reason.to_string(),
            },
        );
        failed.event_id = EventId::new(format!(
            "{}:restore:{}:{}",
            provider,
            key.as_str(),
            EventType::RestoreFailed
        ))?;
        Ok(self.appender.handle(failed, false).await?.projection)
    }
}

fn command_event(
    cmd: &RestorePurchaseCommand,
    provider: Provider,
    idempotency_key: Option<IdempotencyKey>,
    payload: EventPayload,
) -> CanonicalEvent {
    let now = Timestamp::now();
    CanonicalEvent {
        event_id: EventId::generate(),
        user_id: cmd.user_id.clone(),
        provider,
        product_key: cmd.product_key,
        plan_type: cmd.product_key.default_plan_type(),
        occurred_at: now,
        received_at: now,
        provider_event_id: None,
        provider_transaction_id: None,
        idempotency_key,
        payload,
        payload_hash: None,
    }
}

/// Builds the grant for a restored purchase.
///
/// Its id depends only on the provider session, so repeated restores of one
/// purchase collapse onto a single ledger row.
fn restore_succeeded(
    cmd: &RestorePurchaseCommand,
    provider: Provider,
    purchase: &CompletedPurchase,
) -> Result<CanonicalEvent, BillingError> {
    let event_id = EventId::new(format!(
        "{}:restore:{}:{}",
        provider,
        purchase.session_id,
        EventType::RestoreSucceeded
    ))?;

    Ok(CanonicalEvent {
        event_id,
        user_id: cmd.user_id.clone(),
        provider,
        product_key: cmd.product_key,
        plan_type: purchase.plan_type,
        occurred_at: purchase.created_at,
        received_at: Timestamp::now(),
        provider_event_id: None,
        provider_transaction_id: Some(purchase.transaction_id.clone()),
        idempotency_key: None,
        payload: EventPayload::RestoreSucceeded {
            origin: cmd.origin,
            transaction_id: purchase.transaction_id.clone(),
            checkout_session_id: purchase.session_id.clone(),
            amount_cents: purchase.amount_cents,
            currency: purchase.currency.clone(),
            customer_id: purchase.customer_id.clone(),
            subscription: None,
        },
        payload_hash: None,
    })
}
