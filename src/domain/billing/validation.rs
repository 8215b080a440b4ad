//! Structural validation for canonical events.
//!
//! Enum fields are enforced by the type system; these checks cover what types
//! cannot express: non-empty identifiers, amount ranges, currency codes and
//! period ordering.

use super::event::{CanonicalEvent, EventPayload, SubscriptionPeriod};
use crate::domain::foundation::ValidationError;

/// Validates a complete event, envelope and payload.
pub fn validate_event(event: &CanonicalEvent) -> Result<(), ValidationError> {
    require_non_empty("event_id", event.event_id.as_str())?;
    require_non_empty("user_id", event.user_id.as_str())?;
    require_optional_non_empty("provider_event_id", event.provider_event_id.as_deref())?;
    require_optional_non_empty(
        "provider_transaction_id",
        event.provider_transaction_id.as_deref(),
    )?;

    if let Some(hash) = &event.payload_hash {
        if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ValidationError::invalid_format(
                "payload_hash",
                "must be 64 hex characters",
            ));
        }
    }

    validate_payload(&event.payload)
}

/// Validates the type-specific payload rules.
pub fn validate_payload(payload: &EventPayload) -> Result<(), ValidationError> {
    match payload {
        EventPayload::PurchaseInitiated {
            checkout_session_id,
        } => require_non_empty("checkout_session_id", checkout_session_id),

        EventPayload::PurchaseSucceeded {
            transaction_id,
            amount_cents,
            currency,
            checkout_session_id,
            customer_id,
            account_id,
            subscription,
        } => {
            require_non_empty("transaction_id", transaction_id)?;
            require_amount("amount_cents", *amount_cents)?;
            require_currency(currency)?;
            require_optional_non_empty("checkout_session_id", checkout_session_id.as_deref())?;
            require_optional_non_empty("customer_id", customer_id.as_deref())?;
            require_optional_non_empty("account_id", account_id.as_deref())?;
            validate_period(subscription.as_ref())
        }

        EventPayload::PurchaseFailed {
            reason,
            checkout_session_id,
        } => {
            require_non_empty("reason", reason)?;
            require_optional_non_empty("checkout_session_id", checkout_session_id.as_deref())
        }

        EventPayload::RefundIssued {
            transaction_id,
            refund_id,
            amount_cents,
        } => {
            require_non_empty("transaction_id", transaction_id)?;
            require_non_empty("refund_id", refund_id)?;
            match amount_cents {
                Some(amount) => require_amount("amount_cents", *amount),
                None => Ok(()),
            }
        }

        EventPayload::ChargebackOpened {
            transaction_id,
            dispute_id,
        }
        | EventPayload::ChargebackWon {
            transaction_id,
            dispute_id,
        }
        | EventPayload::ChargebackLost {
            transaction_id,
            dispute_id,
        } => {
            require_non_empty("transaction_id", transaction_id)?;
            require_non_empty("dispute_id", dispute_id)
        }

        EventPayload::EntitlementGranted {
            reason,
            granted_by,
            subscription,
        } => {
            require_non_empty("reason", reason)?;
            require_optional_non_empty("granted_by", granted_by.as_deref())?;
            validate_period(subscription.as_ref())
        }

        EventPayload::EntitlementRevoked { reason, revoked_by } => {
            require_non_empty("reason", reason)?;
            require_optional_non_empty("revoked_by", revoked_by.as_deref())
        }

        EventPayload::RestoreRequested { .. } => Ok(()),

        EventPayload::RestoreSucceeded {
            transaction_id,
            checkout_session_id,
            amount_cents,
            currency,
            customer_id,
            subscription,
            ..
        } => {
            require_non_empty("transaction_id", transaction_id)?;
            require_non_empty("checkout_session_id", checkout_session_id)?;
            require_amount("amount_cents", *amount_cents)?;
            require_currency(currency)?;
            require_optional_non_empty("customer_id", customer_id.as_deref())?;
            validate_period(subscription.as_ref())
        }

        EventPayload::RestoreFailed { reason, .. } => require_non_empty("reason", reason),
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::empty_field(field));
    }
    Ok(())
}

fn require_optional_non_empty(field: &str, value: Option<&str>) -> Result<(), ValidationError> {
    match value {
        Some(v) => require_non_empty(field, v),
        None => Ok(()),
    }
}

fn require_amount(field: &str, amount: i64) -> Result<(), ValidationError> {
    if amount < 0 {
        return Err(ValidationError::out_of_range(field, 0, i64::MAX, amount));
    }
    Ok(())
}

fn require_currency(currency: &str) -> Result<(), ValidationError> {
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ValidationError::invalid_format(
            "currency",
            "must be a 3-letter code",
        ));
    }
    Ok(())
}

fn validate_period(period: Option<&SubscriptionPeriod>) -> Result<(), ValidationError> {
    if let Some(p) = period {
        if !p.period_start.is_before(&p.period_end) {
            return Err(ValidationError::invalid_format(
                "period_end",
                "must be after period_start",
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::catalog::{PlanType, ProductKey, Provider};
    use crate::domain::billing::event::{EventId, RestoreOrigin};
    use crate::domain::foundation::{Timestamp, UserId};

    fn succeeded(amount_cents: i64, currency: &str) -> EventPayload {
        EventPayload::PurchaseSucceeded {
            transaction_id: "pi_1".to_string(),
            amount_cents,
            currency: currency.to_string(),
            checkout_session_id: None,
            customer_id: None,
            account_id: None,
            subscription: None,
        }
    }

    fn event_with(payload: EventPayload) -> CanonicalEvent {
        let at = Timestamp::from_unix_secs(1_700_000_000).unwrap();
        CanonicalEvent {
            event_id: EventId::new("manual:1").unwrap(),
            user_id: UserId::new("user_1").unwrap(),
            provider: Provider::Manual,
            product_key: ProductKey::Lifetime,
            plan_type: PlanType::OneTime,
            occurred_at: at,
            received_at: at,
            provider_event_id: None,
            provider_transaction_id: None,
            idempotency_key: None,
            payload,
            payload_hash: None,
        }
    }

    // ══════════════════════════════════════════════════════════════
    // Payload rules
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn accepts_valid_purchase() {
        assert!(validate_payload(&succeeded(0, "usd")).is_ok());
        assert!(validate_payload(&succeeded(4900, "EUR")).is_ok());
    }

    #[test]
    fn rejects_negative_amount() {
        let err = validate_payload(&succeeded(-1, "usd")).unwrap_err();
        assert_eq!(err.field(), "amount_cents");
    }

    #[test]
    fn rejects_bad_currency() {
        assert!(validate_payload(&succeeded(100, "us")).is_err());
        assert!(validate_payload(&succeeded(100, "usdt")).is_err());
        assert!(validate_payload(&succeeded(100, "u$d")).is_err());
    }

    #[test]
    fn rejects_empty_dispute_id() {
        let payload = EventPayload::ChargebackOpened {
            transaction_id: "pi_1".to_string(),
            dispute_id: " ".to_string(),
        };
        assert_eq!(validate_payload(&payload).unwrap_err().field(), "dispute_id");
    }

    #[test]
    fn rejects_negative_refund_amount() {
        let payload = EventPayload::RefundIssued {
            transaction_id: "pi_1".to_string(),
            refund_id: "re_1".to_string(),
            amount_cents: Some(-5),
        };
        assert!(validate_payload(&payload).is_err());
    }

    #[test]
    fn refund_amount_is_optional() {
        let payload = EventPayload::RefundIssued {
            transaction_id: "pi_1".to_string(),
            refund_id: "re_1".to_string(),
            amount_cents: None,
        };
        assert!(validate_payload(&payload).is_ok());
    }

    #[test]
    fn rejects_inverted_period() {
        let start = Timestamp::from_unix_secs(2_000).unwrap();
        let payload = EventPayload::EntitlementGranted {
            reason: "comp".to_string(),
            granted_by: None,
            subscription: Some(SubscriptionPeriod {
                period_start: start,
                period_end: start,
                auto_renew: true,
            }),
        };
        assert_eq!(validate_payload(&payload).unwrap_err().field(), "period_end");
    }

    #[test]
    fn restore_requested_has_no_extra_rules() {
        let payload = EventPayload::RestoreRequested {
            origin: RestoreOrigin::Support,
        };
        assert!(validate_payload(&payload).is_ok());
    }

    // ══════════════════════════════════════════════════════════════
    // Envelope rules
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn rejects_blank_provider_event_id() {
        let mut event = event_with(succeeded(100, "usd"));
        event.provider_event_id = Some(String::new());
        assert_eq!(event.validate().unwrap_err().field(), "provider_event_id");
    }

    #[test]
    fn rejects_malformed_payload_hash() {
        let mut event = event_with(succeeded(100, "usd"));
        event.payload_hash = Some("abc".to_string());
        assert!(event.validate().is_err());

        event.payload_hash = Some("a".repeat(64));
        assert!(event.validate().is_ok());
    }
}
