//! StartCheckoutHandler - Command handler for opening a provider checkout.

use std::sync::Arc;

use super::append_and_project::{AppendAndProjectHandler, AppendResult};
use crate::domain::billing::{
    build_command_dedupe_key, BillingError, CanonicalEvent, EventId, EventPayload, ProductKey,
};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::{
    BillingLogEntry, BillingLogSink, BillingProvider, BillingStore, CheckoutSession,
    CreateCheckoutRequest,
};

/// Command to start a checkout.
#[derive(Debug, Clone)]
pub struct StartCheckoutCommand {
    pub user_id: UserId,
    pub product_key: ProductKey,
    pub email: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
    /// Client-supplied key; a retry with the same key is a no-op.
    pub idempotency_key: String,
}

/// Result of starting a checkout.
#[derive(Debug, Clone)]
pub struct StartCheckoutResult {
    pub checkout_session: CheckoutSession,
    /// The `purchase_initiated` append (deduplicated on retry).
    pub append: AppendResult,
}

/// Handler for starting a checkout.
///
/// The same idempotency key goes to the provider and onto the ledger row,
/// so a retried command reuses the provider session and records nothing new.
pub struct StartCheckoutHandler {
    provider: Arc<dyn BillingProvider>,
    appender: AppendAndProjectHandler,
    log: Arc<dyn BillingLogSink>,
}

impl StartCheckoutHandler {
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
        cmd: StartCheckoutCommand,
    ) -> Result<StartCheckoutResult, BillingError> {
        // 1. Normalize the dedupe key
        let key = build_command_dedupe_key(&cmd.idempotency_key)?;

        // 2. Create the provider session
        let checkout_session = self
            .provider
            .create_checkout_session(CreateCheckoutRequest {
                user_id: cmd.user_id.clone(),
                product_key: cmd.product_key,
                email: cmd.email,
                success_url: cmd.success_url,
                cancel_url: cmd.cancel_url,
                idempotency_key: Some(key.clone()),
            })
            .await
            .map_err(|err| {
                self.log.record(
                    BillingLogEntry::error("checkout_creation_failed")
                        .with_field("user_id", &cmd.user_id)
                        .with_field("product_key", cmd.product_key)
                        .with_field("error", &err),
                );
                BillingError::Provider(err)
            })?;

        // 3. Record the intent
        let now = Timestamp::now();
        let event = CanonicalEvent {
            event_id: EventId::generate(),
            user_id: cmd.user_id,
            provider: self.provider.provider(),
            product_key: cmd.product_key,
            plan_type: cmd.product_key.default_plan_type(),
            occurred_at: now,
            received_at: now,
            provider_event_id: None,
            provider_transaction_id: None,
            idempotency_key: Some(key),
            payload: EventPayload::PurchaseInitiated {
                checkout_session_id: checkout_session.id.clone(),
            },
            payload_hash: None,
        };
        let append = self.appender.handle(event, false).await?;

        Ok(StartCheckoutResult {
            checkout_session,
            append,
        })
    }
}
