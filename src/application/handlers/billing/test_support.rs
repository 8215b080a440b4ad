//! Shared fixtures for billing handler tests.

use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;

use crate::domain::billing::{
    CanonicalEvent, EventId, EventPayload, IdempotencyKey, PlanType, ProductKey,
    Provider, RestoreOrigin,
};
use crate::domain::foundation::{Timestamp, UserId};

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";
pub const OCCURRED: i64 = 1_704_067_200;

pub fn user() -> UserId {
    UserId::new("user_42").unwrap()
}

pub fn ts(secs: i64) -> Timestamp {
    Timestamp::from_unix_secs(secs).unwrap()
}

fn provider_event(provider_event_id: &str, at: i64, payload: EventPayload) -> CanonicalEvent {
    let event_type = payload.event_type();
    CanonicalEvent {
        event_id: EventId::for_provider_event(Provider::Stripe, provider_event_id, event_type),
        user_id: user(),
        provider: Provider::Stripe,
        product_key: ProductKey::Lifetime,
        plan_type: PlanType::OneTime,
        occurred_at: ts(at),
        received_at: ts(at + 1),
        provider_event_id: Some(provider_event_id.to_string()),
        provider_transaction_id: Some("pi_1".to_string()),
        idempotency_key: None,
        payload,
        payload_hash: None,
    }
}

pub fn lifetime_purchase(provider_event_id: &str) -> CanonicalEvent {
    provider_event(
        provider_event_id,
        OCCURRED,
        EventPayload::PurchaseSucceeded {
            transaction_id: "pi_1".to_string(),
            amount_cents: 4900,
            currency: "usd".to_string(),
            checkout_session_id: Some("cs_1".to_string()),
            customer_id: Some("cus_1".to_string()),
            account_id: None,
            subscription: None,
        },
    )
}

pub fn refund(provider_event_id: &str) -> CanonicalEvent {
    provider_event(
        provider_event_id,
        OCCURRED + 3_600,
        EventPayload::RefundIssued {
            transaction_id: "pi_1".to_string(),
            refund_id: "re_1".to_string(),
            amount_cents: Some(4900),
        },
    )
}

pub fn restore_requested(event_id: &str, key: Option<IdempotencyKey>) -> CanonicalEvent {
    let at = ts(OCCURRED);
    CanonicalEvent {
        event_id: EventId::new(event_id).unwrap(),
        user_id: user(),
        provider: Provider::Stripe,
        product_key: ProductKey::Lifetime,
        plan_type: PlanType::OneTime,
        occurred_at: at,
        received_at: at,
        provider_event_id: None,
        provider_transaction_id: None,
        idempotency_key: key,
        payload: EventPayload::RestoreRequested {
            origin: RestoreOrigin::User,
        },
        payload_hash: None,
    }
}

/// A paid `checkout.session.completed` body for the lifetime product.
pub fn checkout_completed_body(stripe_event_id: &str) -> Vec<u8> {
    json!({
        "id": stripe_event_id,
        "type": "checkout.session.completed",
        "created": OCCURRED,
        "livemode": false,
        "data": {
            "object": {
                "id": "cs_1",
                "object": "checkout.session",
                "mode": "payment",
                "status": "complete",
                "payment_status": "paid",
                "amount_total": 4900,
                "currency": "usd",
                "customer": "cus_1",
                "payment_intent": "pi_1",
                "metadata": { "user_id": "user_42", "product_key": "lifetime" }
            }
        }
    })
    .to_string()
    .into_bytes()
}

/// Signs `body` the way Stripe does, stamped with the current time.
pub fn sign(body: &[u8]) -> String {
    let t = Timestamp::now().as_unix_secs();
    let mut mac = Hmac::<Sha256>::new_from_slice(WEBHOOK_SECRET.as_bytes()).unwrap();
    mac.update(t.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    format!("t={},v1={}", t, hex::encode(mac.finalize().into_bytes()))
}
