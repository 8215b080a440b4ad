//! HandleBillingWebhookHandler - Verifies, normalizes and records provider webhooks.

use std::sync::Arc;

use super::append_and_project::{AppendAndProjectHandler, AppendResult};
use crate::domain::billing::BillingError;
use crate::domain::foundation::Timestamp;
use crate::ports::{BillingLogEntry, BillingLogSink, BillingProvider, BillingStore};

/// Command to handle a provider webhook.
#[derive(Debug, Clone)]
pub struct HandleBillingWebhookCommand {
    /// Raw request body, exactly as received.
    pub payload: Vec<u8>,
    /// Signature header value.
    pub signature: String,
}

/// What happened to a webhook with a valid signature.
#[derive(Debug, Clone)]
pub struct WebhookOutcome {
    /// True when the event was not on the allow-list or had no
    /// user/product reference. Nothing was written.
    pub ignored: bool,
    pub append: Option<AppendResult>,
}

impl WebhookOutcome {
    /// True when this delivery added a ledger row.
    pub fn appended(&self) -> bool {
        self.append.as_ref().is_some_and(|a| a.appended)
    }
}

/// Handler for inbound billing webhooks.
///
/// The signature is checked against the raw bytes before anything parses
/// them. Unsupported events are acknowledged as ignored so the provider
/// stops redelivering them.
pub struct HandleBillingWebhookHandler {
    provider: Arc<dyn BillingProvider>,
    appender: AppendAndProjectHandler,
    log: Arc<dyn BillingLogSink>,
}

impl HandleBillingWebhookHandler {
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
        cmd: HandleBillingWebhookCommand,
    ) -> Result<WebhookOutcome, BillingError> {
        // 1. Authenticate the raw body
        if !self.provider.verify_signature(&cmd.payload, &cmd.signature) {
            self.log.record(
                BillingLogEntry::warn("webhook_signature_rejected")
                    .with_field("provider", self.provider.provider())
                    .with_field("body_len", cmd.payload.len()),
            );
            return Err(BillingError::InvalidSignature);
        }

        // 2. Normalize to at most one canonical event
        let received_at = Timestamp::now();
        let Some(event) = self.provider.normalize_webhook(&cmd.payload, received_at) else {
            self.log.record(
                BillingLogEntry::info("webhook_ignored")
                    .with_field("provider", self.provider.provider()),
            );
            return Ok(WebhookOutcome {
                ignored: true,
                append: None,
            });
        };

        // 3. Record it
        let append = self.appender.handle(event, true).await?;

        Ok(WebhookOutcome {
            ignored: false,
            append: Some(append),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryBillingStore, InMemoryLogSink, MockBillingProvider};
    use crate::application::handlers::billing::test_support::{
        checkout_completed_body, sign, user, WEBHOOK_SECRET,
    };
    use crate::domain::billing::{EntitlementStatus, EventType, ProductKey};
    use serde_json::json;

    struct Fixture {
        handler: HandleBillingWebhookHandler,
        store: InMemoryBillingStore,
        log: Arc<InMemoryLogSink>,
    }

    fn fixture(provider: MockBillingProvider) -> Fixture {
        let store = InMemoryBillingStore::new();
        let log = Arc::new(InMemoryLogSink::new());
        let handler = HandleBillingWebhookHandler::new(
            Arc::new(provider),
            Arc::new(store.clone()),
            log.clone(),
        );
        Fixture {
            handler,
            store,
            log,
        }
    }

    fn signed(body: Vec<u8>) -> HandleBillingWebhookCommand {
        let signature = sign(&body);
        HandleBillingWebhookCommand {
            payload: body,
            signature,
        }
    }

    // ══════════════════════════════════════════════════════════════
    // Signatures
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn bad_signature_is_rejected_without_parsing() {
        let provider = MockBillingProvider::with_webhook_secret(WEBHOOK_SECRET, 300);
        let f = fixture(provider.clone());

        let err = f
            .handler
            .handle(HandleBillingWebhookCommand {
                payload: checkout_completed_body("evt_1"),
                signature: "t=1,v1=deadbeef".to_string(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::InvalidSignature));
        assert!(!provider.was_called("normalize_webhook"));
        assert_eq!(f.store.event_count().await, 0);
        assert_eq!(f.log.with_message("webhook_signature_rejected").len(), 1);
    }

    #[tokio::test]
    async fn tampered_body_is_rejected() {
        let f = fixture(MockBillingProvider::with_webhook_secret(WEBHOOK_SECRET, 300));
        let mut cmd = signed(checkout_completed_body("evt_1"));
        cmd.payload = checkout_completed_body("evt_2");

        let err = f.handler.handle(cmd).await.unwrap_err();
        assert!(matches!(err, BillingError::InvalidSignature));
    }

    // ══════════════════════════════════════════════════════════════
    // Normalization
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn paid_checkout_grants_entitlement() {
        let f = fixture(MockBillingProvider::with_webhook_secret(WEBHOOK_SECRET, 300));

        let outcome = f
            .handler
            .handle(signed(checkout_completed_body("evt_1")))
            .await
            .unwrap();

        assert!(!outcome.ignored);
        assert!(outcome.appended());
        let append = outcome.append.unwrap();
        assert_eq!(append.ledger_event.event.event_type(), EventType::PurchaseSucceeded);
        assert!(append.ledger_event.signature_verified);
        assert!(append.ledger_event.event.payload_hash.is_some());
        assert_eq!(append.projection.status, EntitlementStatus::Active);
        assert_eq!(append.projection.provider_customer_id.as_deref(), Some("cus_1"));
    }

    #[tokio::test]
    async fn unsupported_event_is_ignored() {
        let f = fixture(MockBillingProvider::with_webhook_secret(WEBHOOK_SECRET, 300));
        let body = json!({
            "id": "evt_9",
            "type": "customer.created",
            "created": 1_704_067_200,
            "data": { "object": { "id": "cus_1" } }
        })
        .to_string()
        .into_bytes();

        let outcome = f.handler.handle(signed(body)).await.unwrap();

        assert!(outcome.ignored);
        assert!(outcome.append.is_none());
        assert!(!outcome.appended());
        assert_eq!(f.store.event_count().await, 0);
        assert_eq!(f.log.with_message("webhook_ignored").len(), 1);
    }

    #[tokio::test]
    async fn redelivery_is_recorded_once() {
        let f = fixture(MockBillingProvider::with_webhook_secret(WEBHOOK_SECRET, 300));
        let body = checkout_completed_body("evt_1");

        let mut outcomes = Vec::new();
        for _ in 0..3 {
            outcomes.push(f.handler.handle(signed(body.clone())).await.unwrap());
        }

        assert!(outcomes[0].appended());
        for later in &outcomes[1..] {
            assert!(!later.ignored);
            assert!(!later.appended());
        }
        assert_eq!(f.store.event_count().await, 1);
        let projection = f
            .store
            .find_entitlement(&user(), ProductKey::Lifetime)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(projection.version, 1);
    }
}
