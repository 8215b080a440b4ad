//! Stripe webhook normalizer.
//!
//! Maps a Stripe event envelope to at most one canonical event. Anything not
//! on the allow-list, anything without a user/product reference, and anything
//! that fails canonical validation normalizes to `None`: the webhook is
//! acknowledged and nothing is written.
//!
//! | Stripe event                                   | Canonical type       |
//! |------------------------------------------------|----------------------|
//! | `checkout.session.completed` (paid)            | `purchase_succeeded` |
//! | `checkout.session.async_payment_succeeded`     | `purchase_succeeded` |
//! | `checkout.session.expired`                     | `purchase_failed`    |
//! | `checkout.session.async_payment_failed`        | `purchase_failed`    |
//! | `payment_intent.payment_failed`                | `purchase_failed`    |
//! | `charge.refunded`                              | `refund_issued`      |
//! | `charge.dispute.created`                       | `chargeback_opened`  |
//! | `charge.dispute.closed` (won / lost)           | `chargeback_won/lost`|

use serde_json::Value;
use sha2::{Digest, Sha256};

use super::webhook_types::{expandable_id, StripeWebhookEvent};
use crate::domain::billing::{
    CanonicalEvent, EventId, EventPayload, PlanType, ProductKey, Provider, SubscriptionPeriod,
};
use crate::domain::foundation::{Timestamp, UserId};

/// Metadata keys written on checkout sessions and payment intents.
pub const METADATA_USER_ID: &str = "user_id";
pub const METADATA_PRODUCT_KEY: &str = "product_key";

/// Parses, normalizes and stamps the payload hash of a raw webhook body.
pub fn normalize_body(raw: &[u8], received_at: Timestamp) -> Option<CanonicalEvent> {
    let event = StripeWebhookEvent::parse(raw)?;
    let mut canonical = normalize(&event, received_at)?;
    canonical.payload_hash = Some(payload_hash(raw));
    Some(canonical)
}

/// SHA-256 of the raw body, hex encoded.
pub fn payload_hash(raw: &[u8]) -> String {
    hex::encode(Sha256::digest(raw))
}

/// Maps a parsed Stripe event to a canonical event.
pub fn normalize(event: &StripeWebhookEvent, received_at: Timestamp) -> Option<CanonicalEvent> {
    let object = event.object();

    let mapped = match event.event_type.as_str() {
        "checkout.session.completed" => {
            let status = str_field(object, "payment_status");
            if !matches!(status, Some("paid") | Some("no_payment_required")) {
                return None;
            }
            checkout_succeeded(event, object)
        }
        "checkout.session.async_payment_succeeded" => checkout_succeeded(event, object),
        "checkout.session.expired" => checkout_failed(object, "checkout_expired"),
        "checkout.session.async_payment_failed" => checkout_failed(object, "async_payment_failed"),
        "payment_intent.payment_failed" => payment_intent_failed(object),
        "charge.refunded" => charge_refunded(event, object),
        "charge.dispute.created" => dispute(object, DisputeOutcome::Opened),
        "charge.dispute.closed" => match str_field(object, "status") {
            Some("won") => dispute(object, DisputeOutcome::Won),
            Some("lost") => dispute(object, DisputeOutcome::Lost),
            _ => None,
        },
        _ => None,
    };

    let Some(Mapped {
        payload,
        transaction_id,
        plan_type,
    }) = mapped
    else {
        tracing::debug!(
            event_id = %event.id,
            event_type = %event.event_type,
            "Stripe event not mapped to a billing event"
        );
        return None;
    };

    let Some((user_id, product_key)) = billing_reference(object) else {
        tracing::debug!(
            event_id = %event.id,
            event_type = %event.event_type,
            "Stripe event has no user/product metadata"
        );
        return None;
    };

    let occurred_at = Timestamp::from_unix_secs(event.created)?;
    let event_type = payload.event_type();

    let canonical = CanonicalEvent {
        event_id: EventId::for_provider_event(Provider::Stripe, &event.id, event_type),
        user_id,
        provider: Provider::Stripe,
        product_key,
        plan_type: plan_type.unwrap_or_else(|| product_key.default_plan_type()),
        occurred_at,
        received_at,
        provider_event_id: Some(event.id.clone()),
        provider_transaction_id: transaction_id,
        idempotency_key: None,
        payload,
        payload_hash: None,
    };

    if let Err(err) = canonical.validate() {
        tracing::debug!(
            event_id = %event.id,
            error = %err,
            "Normalized Stripe event failed validation"
        );
        return None;
    }

    Some(canonical)
}

struct Mapped {
    payload: EventPayload,
    transaction_id: Option<String>,
    /// Overrides the catalog plan type when the event says otherwise.
    plan_type: Option<PlanType>,
}

enum DisputeOutcome {
    Opened,
    Won,
    Lost,
}

fn checkout_succeeded(event: &StripeWebhookEvent, session: &Value) -> Option<Mapped> {
    let session_id = str_field(session, "id")?.to_string();
    let transaction_id = session
        .get("payment_intent")
        .and_then(expandable_id)
        .or_else(|| session.get("invoice").and_then(expandable_id))
        .unwrap_or_else(|| session_id.clone());

    let is_subscription = str_field(session, "mode") == Some("subscription");
    let plan_type = is_subscription.then_some(PlanType::Subscription);
    let subscription = if is_subscription {
        session.get("subscription").and_then(subscription_period)
    } else {
        None
    };

    Some(Mapped {
        payload: EventPayload::PurchaseSucceeded {
            transaction_id: transaction_id.clone(),
            amount_cents: session.get("amount_total").and_then(Value::as_i64).unwrap_or(0),
            currency: str_field(session, "currency")?.to_string(),
            checkout_session_id: Some(session_id),
            customer_id: session.get("customer").and_then(expandable_id),
            account_id: event.account.clone(),
            subscription,
        },
        transaction_id: Some(transaction_id),
        plan_type,
    })
}

/// Reads the billing period from an expanded subscription object.
///
/// Older API versions carry the period on the subscription, newer ones on
/// its first item. A bare subscription id yields `None`.
fn subscription_period(subscription: &Value) -> Option<SubscriptionPeriod> {
    if !subscription.is_object() {
        return None;
    }
    let period_field = |key: &str| {
        subscription
            .get(key)
            .or_else(|| subscription.pointer(&format!("/items/data/0/{key}")))
            .and_then(Value::as_i64)
            .and_then(Timestamp::from_unix_secs)
    };

    let period_start = period_field("current_period_start")?;
    let period_end = period_field("current_period_end")?;
    if !period_start.is_before(&period_end) {
        return None;
    }

    let cancel_at_period_end = subscription
        .get("cancel_at_period_end")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    Some(SubscriptionPeriod {
        period_start,
        period_end,
        auto_renew: !cancel_at_period_end,
    })
}

fn checkout_failed(session: &Value, reason: &str) -> Option<Mapped> {
    Some(Mapped {
        payload: EventPayload::PurchaseFailed {
            reason: reason.to_string(),
            checkout_session_id: Some(str_field(session, "id")?.to_string()),
        },
        transaction_id: session.get("payment_intent").and_then(expandable_id),
        plan_type: None,
    })
}

fn payment_intent_failed(intent: &Value) -> Option<Mapped> {
    let intent_id = str_field(intent, "id")?.to_string();
    let last_error = intent.get("last_payment_error");
    let reason = last_error
        .and_then(|e| str_field(e, "code").or_else(|| str_field(e, "message")))
        .unwrap_or("payment_failed");

    Some(Mapped {
        payload: EventPayload::PurchaseFailed {
            reason: reason.to_string(),
            checkout_session_id: None,
        },
        transaction_id: Some(intent_id),
        plan_type: None,
    })
}

fn charge_refunded(event: &StripeWebhookEvent, charge: &Value) -> Option<Mapped> {
    let charge_id = str_field(charge, "id")?;
    let transaction_id = charge
        .get("payment_intent")
        .and_then(expandable_id)
        .unwrap_or_else(|| charge_id.to_string());

    let refund_id = charge
        .pointer("/refunds/data/0/id")
        .and_then(Value::as_str)
        .unwrap_or(&event.id)
        .to_string();

    Some(Mapped {
        payload: EventPayload::RefundIssued {
            transaction_id: transaction_id.clone(),
            refund_id,
            amount_cents: charge.get("amount_refunded").and_then(Value::as_i64),
        },
        transaction_id: Some(transaction_id),
        plan_type: None,
    })
}

fn dispute(dispute: &Value, outcome: DisputeOutcome) -> Option<Mapped> {
    let dispute_id = str_field(dispute, "id")?.to_string();
    let transaction_id = dispute
        .get("payment_intent")
        .and_then(expandable_id)
        .or_else(|| dispute.get("charge").and_then(expandable_id))?;

    let payload = match outcome {
        DisputeOutcome::Opened => EventPayload::ChargebackOpened {
            transaction_id: transaction_id.clone(),
            dispute_id,
        },
        DisputeOutcome::Won => EventPayload::ChargebackWon {
            transaction_id: transaction_id.clone(),
            dispute_id,
        },
        DisputeOutcome::Lost => EventPayload::ChargebackLost {
            transaction_id: transaction_id.clone(),
            dispute_id,
        },
    };

    Some(Mapped {
        payload,
        transaction_id: Some(transaction_id),
        plan_type: None,
    })
}

/// Finds the user and product an object belongs to.
///
/// Looks at the object's own metadata first, then at an expanded `charge`,
/// then at an expanded `payment_intent`.
fn billing_reference(object: &Value) -> Option<(UserId, ProductKey)> {
    let candidates = [
        object.get("metadata"),
        object.get("charge").and_then(|c| c.get("metadata")),
        object.get("payment_intent").and_then(|p| p.get("metadata")),
    ];

    candidates.into_iter().flatten().find_map(metadata_reference)
}

fn metadata_reference(metadata: &Value) -> Option<(UserId, ProductKey)> {
    let user_id = UserId::new(str_field(metadata, METADATA_USER_ID)?).ok()?;
    let product_key = str_field(metadata, METADATA_PRODUCT_KEY)?.parse().ok()?;
    Some((user_id, product_key))
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::EventType;
    use serde_json::json;

    const CREATED: i64 = 1_704_067_200;

    fn received() -> Timestamp {
        Timestamp::from_unix_secs(CREATED + 5).unwrap()
    }

    fn envelope(event_type: &str, object: Value) -> StripeWebhookEvent {
        let raw = json!({
            "id": "evt_123",
            "type": event_type,
            "created": CREATED,
            "livemode": false,
            "data": { "object": object }
        });
        StripeWebhookEvent::parse(raw.to_string().as_bytes()).unwrap()
    }

    fn metadata() -> Value {
        json!({ "user_id": "user_42", "product_key": "lifetime" })
    }

    fn paid_session() -> Value {
        json!({
            "id": "cs_1",
            "object": "checkout.session",
            "mode": "payment",
            "status": "complete",
            "payment_status": "paid",
            "amount_total": 4900,
            "currency": "usd",
            "customer": "cus_1",
            "payment_intent": "pi_1",
            "metadata": metadata()
        })
    }

    // ══════════════════════════════════════════════════════════════
    // Checkout sessions
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn paid_checkout_becomes_purchase_succeeded() {
        let event = normalize(&envelope("checkout.session.completed", paid_session()), received())
            .unwrap();

        assert_eq!(event.event_type(), EventType::PurchaseSucceeded);
        assert_eq!(event.event_id.as_str(), "stripe:evt_123:purchase_succeeded");
        assert_eq!(event.user_id.as_str(), "user_42");
        assert_eq!(event.product_key, ProductKey::Lifetime);
        assert_eq!(event.plan_type, PlanType::OneTime);
        assert_eq!(event.provider_event_id.as_deref(), Some("evt_123"));
        assert_eq!(event.provider_transaction_id.as_deref(), Some("pi_1"));
        assert_eq!(event.occurred_at.as_unix_secs(), CREATED);
        assert_eq!(event.received_at, received());
        match event.payload {
            EventPayload::PurchaseSucceeded {
                amount_cents,
                ref currency,
                ref customer_id,
                ref checkout_session_id,
                ..
            } => {
                assert_eq!(amount_cents, 4900);
                assert_eq!(currency, "usd");
                assert_eq!(customer_id.as_deref(), Some("cus_1"));
                assert_eq!(checkout_session_id.as_deref(), Some("cs_1"));
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn unpaid_checkout_is_ignored() {
        let mut session = paid_session();
        session["payment_status"] = json!("unpaid");
        assert!(normalize(&envelope("checkout.session.completed", session), received()).is_none());
    }

    #[test]
    fn async_success_does_not_check_payment_status() {
        let event = normalize(
            &envelope("checkout.session.async_payment_succeeded", paid_session()),
            received(),
        )
        .unwrap();
        assert_eq!(event.event_type(), EventType::PurchaseSucceeded);
    }

    #[test]
    fn subscription_mode_sets_plan_type() {
        let mut session = paid_session();
        session["mode"] = json!("subscription");
        session["invoice"] = json!("in_1");
        session["payment_intent"] = Value::Null;
        session["metadata"]["product_key"] = json!("pro_monthly");

        let event = normalize(&envelope("checkout.session.completed", session), received()).unwrap();
        assert_eq!(event.plan_type, PlanType::Subscription);
        assert_eq!(event.provider_transaction_id.as_deref(), Some("in_1"));
    }

    #[test]
    fn expanded_subscription_carries_period() {
        let mut session = paid_session();
        session["mode"] = json!("subscription");
        session["metadata"]["product_key"] = json!("pro_monthly");
        session["subscription"] = json!({
            "id": "sub_1",
            "cancel_at_period_end": true,
            "items": { "data": [ {
                "current_period_start": CREATED,
                "current_period_end": CREATED + 2_592_000
            } ] }
        });

        let event = normalize(&envelope("checkout.session.completed", session), received()).unwrap();
        let period = event.payload.subscription().cloned().unwrap();
        assert_eq!(period.period_start.as_unix_secs(), CREATED);
        assert_eq!(period.period_end.as_unix_secs(), CREATED + 2_592_000);
        assert!(!period.auto_renew);
    }

    #[test]
    fn subscription_id_without_expansion_has_no_period() {
        let mut session = paid_session();
        session["mode"] = json!("subscription");
        session["metadata"]["product_key"] = json!("pro_monthly");
        session["subscription"] = json!("sub_1");

        let event = normalize(&envelope("checkout.session.completed", session), received()).unwrap();
        assert!(event.payload.subscription().is_none());
    }

    #[test]
    fn expired_checkout_becomes_purchase_failed() {
        let event = normalize(&envelope("checkout.session.expired", paid_session()), received())
            .unwrap();
        assert_eq!(event.event_type(), EventType::PurchaseFailed);
        assert_eq!(event.event_id.as_str(), "stripe:evt_123:purchase_failed");
    }

    #[test]
    fn checkout_without_currency_fails_validation() {
        let mut session = paid_session();
        session["currency"] = json!("dollars");
        assert!(normalize(&envelope("checkout.session.completed", session), received()).is_none());
    }

    // ══════════════════════════════════════════════════════════════
    // Charges and disputes
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn refund_reads_refund_id_and_amount() {
        let charge = json!({
            "id": "ch_1",
            "payment_intent": "pi_1",
            "amount_refunded": 4900,
            "refunds": { "data": [ { "id": "re_1" } ] },
            "metadata": metadata()
        });
        let event = normalize(&envelope("charge.refunded", charge), received()).unwrap();
        assert_eq!(
            event.payload,
            EventPayload::RefundIssued {
                transaction_id: "pi_1".to_string(),
                refund_id: "re_1".to_string(),
                amount_cents: Some(4900),
            }
        );
    }

    #[test]
    fn refund_without_refund_list_uses_event_id() {
        let charge = json!({ "id": "ch_1", "metadata": metadata() });
        let event = normalize(&envelope("charge.refunded", charge), received()).unwrap();
        match event.payload {
            EventPayload::RefundIssued {
                transaction_id,
                refund_id,
                ..
            } => {
                assert_eq!(transaction_id, "ch_1");
                assert_eq!(refund_id, "evt_123");
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn dispute_metadata_falls_back_to_expanded_charge() {
        let dispute = json!({
            "id": "dp_1",
            "status": "needs_response",
            "charge": { "id": "ch_1", "metadata": metadata() },
            "metadata": {}
        });
        let event = normalize(&envelope("charge.dispute.created", dispute), received()).unwrap();
        assert_eq!(event.event_type(), EventType::ChargebackOpened);
        assert_eq!(event.user_id.as_str(), "user_42");
        assert_eq!(event.provider_transaction_id.as_deref(), Some("ch_1"));
    }

    #[test]
    fn metadata_falls_back_to_expanded_payment_intent() {
        let dispute = json!({
            "id": "dp_1",
            "status": "lost",
            "charge": "ch_1",
            "payment_intent": { "id": "pi_1", "metadata": metadata() }
        });
        let event = normalize(&envelope("charge.dispute.closed", dispute), received()).unwrap();
        assert_eq!(event.event_type(), EventType::ChargebackLost);
        assert_eq!(event.provider_transaction_id.as_deref(), Some("pi_1"));
    }

    #[test]
    fn dispute_closed_won() {
        let dispute = json!({
            "id": "dp_1", "status": "won", "charge": "ch_1", "metadata": metadata()
        });
        let event = normalize(&envelope("charge.dispute.closed", dispute), received()).unwrap();
        assert_eq!(event.event_type(), EventType::ChargebackWon);
    }

    #[test]
    fn dispute_closed_with_other_status_is_ignored() {
        let dispute = json!({
            "id": "dp_1", "status": "warning_closed", "charge": "ch_1", "metadata": metadata()
        });
        assert!(normalize(&envelope("charge.dispute.closed", dispute), received()).is_none());
    }

    #[test]
    fn payment_intent_failure_uses_error_code() {
        let intent = json!({
            "id": "pi_1",
            "last_payment_error": { "code": "card_declined", "message": "Your card was declined." },
            "metadata": metadata()
        });
        let event =
            normalize(&envelope("payment_intent.payment_failed", intent), received()).unwrap();
        match event.payload {
            EventPayload::PurchaseFailed { reason, .. } => assert_eq!(reason, "card_declined"),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    // ══════════════════════════════════════════════════════════════
    // Rejections
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn unknown_event_type_is_ignored() {
        assert!(normalize(&envelope("customer.created", paid_session()), received()).is_none());
    }

    #[test]
    fn missing_metadata_is_ignored() {
        let mut session = paid_session();
        session["metadata"] = json!({});
        assert!(normalize(&envelope("checkout.session.completed", session), received()).is_none());
    }

    #[test]
    fn unknown_product_is_ignored() {
        let mut session = paid_session();
        session["metadata"]["product_key"] = json!("enterprise");
        assert!(normalize(&envelope("checkout.session.completed", session), received()).is_none());
    }

    #[test]
    fn normalize_body_stamps_payload_hash() {
        let raw = json!({
            "id": "evt_9",
            "type": "checkout.session.completed",
            "created": CREATED,
            "data": { "object": paid_session() }
        })
        .to_string();

        let event = normalize_body(raw.as_bytes(), received()).unwrap();
        assert_eq!(event.payload_hash, Some(payload_hash(raw.as_bytes())));
        assert_eq!(event.payload_hash.as_ref().map(String::len), Some(64));
    }

    #[test]
    fn normalize_body_rejects_garbage() {
        assert!(normalize_body(b"{}", received()).is_none());
        assert!(normalize_body(b"\x00\x01", received()).is_none());
    }
}
