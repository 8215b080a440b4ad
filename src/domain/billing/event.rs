//! Canonical billing events.
//!
//! Every billing fact, whichever provider reported it, is expressed as a
//! [`CanonicalEvent`]. The event type is the discriminant of [`EventPayload`],
//! so the payload shape always matches the declared type.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::catalog::{PlanType, ProductKey, Provider};
use super::idempotency::IdempotencyKey;
use super::validation;
use crate::domain::foundation::{Timestamp, UserId, ValidationError};

/// Globally unique event identifier.
///
/// Provider events use a deterministic id derived from the provider's own
/// event id, so redelivery of the same webhook maps to the same row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Creates an event id, rejecting blank input.
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ValidationError::empty_field("event_id"));
        }
        Ok(Self(id))
    }

    /// Generates a fresh id for a command-originated event.
    pub fn generate() -> Self {
        Self(format!("cmd:{}", uuid::Uuid::new_v4()))
    }

    /// Deterministic id for a provider event: `{provider}:{provider_event_id}:{type}`.
    pub fn for_provider_event(
        provider: Provider,
        provider_event_id: &str,
        event_type: EventType,
    ) -> Self {
        Self(format!("{}:{}:{}", provider, provider_event_id, event_type))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of billing fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PurchaseInitiated,
    PurchaseSucceeded,
    PurchaseFailed,
    RefundIssued,
    ChargebackOpened,
    ChargebackWon,
    ChargebackLost,
    EntitlementGranted,
    EntitlementRevoked,
    RestoreRequested,
    RestoreSucceeded,
    RestoreFailed,
}

impl EventType {
    pub const ALL: [EventType; 12] = [
        EventType::PurchaseInitiated,
        EventType::PurchaseSucceeded,
        EventType::PurchaseFailed,
        EventType::RefundIssued,
        EventType::ChargebackOpened,
        EventType::ChargebackWon,
        EventType::ChargebackLost,
        EventType::EntitlementGranted,
        EventType::EntitlementRevoked,
        EventType::RestoreRequested,
        EventType::RestoreSucceeded,
        EventType::RestoreFailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::PurchaseInitiated => "purchase_initiated",
            EventType::PurchaseSucceeded => "purchase_succeeded",
            EventType::PurchaseFailed => "purchase_failed",
            EventType::RefundIssued => "refund_issued",
            EventType::ChargebackOpened => "chargeback_opened",
            EventType::ChargebackWon => "chargeback_won",
            EventType::ChargebackLost => "chargeback_lost",
            EventType::EntitlementGranted => "entitlement_granted",
            EventType::EntitlementRevoked => "entitlement_revoked",
            EventType::RestoreRequested => "restore_requested",
            EventType::RestoreSucceeded => "restore_succeeded",
            EventType::RestoreFailed => "restore_failed",
        }
    }

    /// Events that turn an entitlement on.
    pub fn is_grant(&self) -> bool {
        matches!(
            self,
            EventType::EntitlementGranted
                | EventType::PurchaseSucceeded
                | EventType::RestoreSucceeded
                | EventType::ChargebackWon
        )
    }

    /// Events that turn an entitlement off.
    pub fn is_revocation(&self) -> bool {
        matches!(
            self,
            EventType::RefundIssued | EventType::ChargebackLost | EventType::EntitlementRevoked
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ValidationError::unknown_value("event_type", s))
    }
}

/// Billing period reported for a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionPeriod {
    pub period_start: Timestamp,
    pub period_end: Timestamp,
    pub auto_renew: bool,
}

/// Who asked for a restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreOrigin {
    User,
    Support,
    Reconciliation,
}

impl RestoreOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestoreOrigin::User => "user",
            RestoreOrigin::Support => "support",
            RestoreOrigin::Reconciliation => "reconciliation",
        }
    }
}

impl fmt::Display for RestoreOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type-specific event data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum EventPayload {
    PurchaseInitiated {
        checkout_session_id: String,
    },
    PurchaseSucceeded {
        transaction_id: String,
        amount_cents: i64,
        currency: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        checkout_session_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        customer_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        account_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subscription: Option<SubscriptionPeriod>,
    },
    PurchaseFailed {
        reason: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        checkout_session_id: Option<String>,
    },
    RefundIssued {
        transaction_id: String,
        refund_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        amount_cents: Option<i64>,
    },
    ChargebackOpened {
        transaction_id: String,
        dispute_id: String,
    },
    ChargebackWon {
        transaction_id: String,
        dispute_id: String,
    },
    ChargebackLost {
        transaction_id: String,
        dispute_id: String,
    },
    EntitlementGranted {
        reason: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        granted_by: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subscription: Option<SubscriptionPeriod>,
    },
    EntitlementRevoked {
        reason: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        revoked_by: Option<String>,
    },
    RestoreRequested {
        origin: RestoreOrigin,
    },
    RestoreSucceeded {
        origin: RestoreOrigin,
        transaction_id: String,
        checkout_session_id: String,
        amount_cents: i64,
        currency: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        customer_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subscription: Option<SubscriptionPeriod>,
    },
    RestoreFailed {
        origin: RestoreOrigin,
        reason: String,
    },
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::PurchaseInitiated { .. } => EventType::PurchaseInitiated,
            EventPayload::PurchaseSucceeded { .. } => EventType::PurchaseSucceeded,
            EventPayload::PurchaseFailed { .. } => EventType::PurchaseFailed,
            EventPayload::RefundIssued { .. } => EventType::RefundIssued,
            EventPayload::ChargebackOpened { .. } => EventType::ChargebackOpened,
            EventPayload::ChargebackWon { .. } => EventType::ChargebackWon,
            EventPayload::ChargebackLost { .. } => EventType::ChargebackLost,
            EventPayload::EntitlementGranted { .. } => EventType::EntitlementGranted,
            EventPayload::EntitlementRevoked { .. } => EventType::EntitlementRevoked,
            EventPayload::RestoreRequested { .. } => EventType::RestoreRequested,
            EventPayload::RestoreSucceeded { .. } => EventType::RestoreSucceeded,
            EventPayload::RestoreFailed { .. } => EventType::RestoreFailed,
        }
    }

    /// Subscription period carried by a grant, if any.
    pub fn subscription(&self) -> Option<&SubscriptionPeriod> {
        match self {
            EventPayload::PurchaseSucceeded { subscription, .. }
            | EventPayload::EntitlementGranted { subscription, .. }
            | EventPayload::RestoreSucceeded { subscription, .. } => subscription.as_ref(),
            _ => None,
        }
    }

    /// Provider customer reference carried by a grant, if any.
    pub fn customer_id(&self) -> Option<&str> {
        match self {
            EventPayload::PurchaseSucceeded { customer_id, .. }
            | EventPayload::RestoreSucceeded { customer_id, .. } => customer_id.as_deref(),
            _ => None,
        }
    }

    /// Provider account reference carried by a grant, if any.
    pub fn account_id(&self) -> Option<&str> {
        match self {
            EventPayload::PurchaseSucceeded { account_id, .. } => account_id.as_deref(),
            _ => None,
        }
    }
}

/// A provider-agnostic billing fact, ready to be appended to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalEvent {
    pub event_id: EventId,
    pub user_id: UserId,
    pub provider: Provider,
    pub product_key: ProductKey,
    pub plan_type: PlanType,
    /// When the fact happened according to the provider.
    pub occurred_at: Timestamp,
    /// When this system ingested it.
    pub received_at: Timestamp,
    #[serde(default)]
    pub provider_event_id: Option<String>,
    #[serde(default)]
    pub provider_transaction_id: Option<String>,
    #[serde(default)]
    pub idempotency_key: Option<IdempotencyKey>,
    #[serde(flatten)]
    pub payload: EventPayload,
    /// SHA-256 hex of the raw provider body. Audit only.
    #[serde(default)]
    pub payload_hash: Option<String>,
}

impl CanonicalEvent {
    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }

    /// Checks structural rules. See [`validation::validate_event`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate_event(self)
    }
}

/// A canonical event as stored in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub event: CanonicalEvent,
    /// Whether the source webhook carried a verified signature.
    pub signature_verified: bool,
    /// Store-assigned insertion order, used to break `received_at` ties.
    pub sequence: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> CanonicalEvent {
        let at = Timestamp::from_unix_secs(1_704_067_200).unwrap();
        CanonicalEvent {
            event_id: EventId::new("stripe:evt_1:purchase_succeeded").unwrap(),
            user_id: UserId::new("user_1").unwrap(),
            provider: Provider::Stripe,
            product_key: ProductKey::Lifetime,
            plan_type: PlanType::OneTime,
            occurred_at: at,
            received_at: at,
            provider_event_id: Some("evt_1".to_string()),
            provider_transaction_id: Some("pi_1".to_string()),
            idempotency_key: None,
            payload: EventPayload::PurchaseSucceeded {
                transaction_id: "pi_1".to_string(),
                amount_cents: 4900,
                currency: "usd".to_string(),
                checkout_session_id: Some("cs_1".to_string()),
                customer_id: None,
                account_id: None,
                subscription: None,
            },
            payload_hash: None,
        }
    }

    // ══════════════════════════════════════════════════════════════
    // Identifiers and types
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn provider_event_ids_are_deterministic() {
        let a = EventId::for_provider_event(Provider::Stripe, "evt_9", EventType::RefundIssued);
        let b = EventId::for_provider_event(Provider::Stripe, "evt_9", EventType::RefundIssued);
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "stripe:evt_9:refund_issued");
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(EventId::generate(), EventId::generate());
        assert!(EventId::generate().as_str().starts_with("cmd:"));
    }

    #[test]
    fn event_id_rejects_blank() {
        assert!(EventId::new("  ").is_err());
    }

    #[test]
    fn event_type_parses_every_variant() {
        for t in EventType::ALL {
            assert_eq!(t.as_str().parse::<EventType>().unwrap(), t);
        }
        assert!("purchase_pending".parse::<EventType>().is_err());
    }

    #[test]
    fn grants_and_revocations_are_disjoint() {
        for t in EventType::ALL {
            assert!(!(t.is_grant() && t.is_revocation()), "{t} is both");
        }
        assert!(EventType::ChargebackWon.is_grant());
        assert!(EventType::ChargebackLost.is_revocation());
        assert!(!EventType::ChargebackOpened.is_grant());
        assert!(!EventType::ChargebackOpened.is_revocation());
    }

    // ══════════════════════════════════════════════════════════════
    // Serialization
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn payload_type_matches_event_type() {
        let event = sample_event();
        assert_eq!(event.event_type(), EventType::PurchaseSucceeded);
    }

    #[test]
    fn serialized_event_carries_type_and_payload() {
        let json = serde_json::to_value(sample_event()).unwrap();
        assert_eq!(json["type"], "purchase_succeeded");
        assert_eq!(json["payload"]["amount_cents"], 4900);
        assert_eq!(json["product_key"], "lifetime");
        assert!(json["payload"].get("subscription").is_none());
    }

    #[test]
    fn event_deserializes_from_json() {
        let original = sample_event();
        let json = serde_json::to_string(&original).unwrap();
        let parsed: CanonicalEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn mismatched_payload_shape_is_rejected() {
        let json = serde_json::json!({
            "type": "refund_issued",
            "payload": { "reason": "requested" }
        });
        assert!(serde_json::from_value::<EventPayload>(json).is_err());
    }

    #[test]
    fn grant_accessors_read_identity() {
        let payload = EventPayload::PurchaseSucceeded {
            transaction_id: "pi_1".to_string(),
            amount_cents: 100,
            currency: "eur".to_string(),
            checkout_session_id: None,
            customer_id: Some("cus_1".to_string()),
            account_id: Some("acct_1".to_string()),
            subscription: None,
        };
        assert_eq!(payload.customer_id(), Some("cus_1"));
        assert_eq!(payload.account_id(), Some("acct_1"));

        let revoke = EventPayload::EntitlementRevoked {
            reason: "abuse".to_string(),
            revoked_by: None,
        };
        assert_eq!(revoke.customer_id(), None);
        assert!(revoke.subscription().is_none());
    }
}
