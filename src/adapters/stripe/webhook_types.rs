//! Stripe-specific types for webhooks and API responses.
//!
//! These types mirror Stripe JSON closely and never leave the adapter.
//! Fields Stripe may return either as an id string or as an expanded object
//! are kept as raw JSON and read through [`expandable_id`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

// ════════════════════════════════════════════════════════════════════════════════
// Stripe Event Types
// ════════════════════════════════════════════════════════════════════════════════

/// Raw Stripe webhook event as received from the API.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeWebhookEvent {
    /// Unique event identifier (evt_...).
    pub id: String,

    /// Event type (e.g., "checkout.session.completed").
    #[serde(rename = "type")]
    pub event_type: String,

    /// Unix timestamp when the event was created.
    pub created: i64,

    /// Event payload containing the affected object.
    pub data: StripeEventData,

    /// Whether this is a live or test event.
    #[serde(default)]
    pub livemode: bool,

    /// Stripe API version used for this event.
    #[serde(default)]
    pub api_version: Option<String>,

    /// Connected account the event belongs to, if any.
    #[serde(default)]
    pub account: Option<String>,
}

/// Event data container.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeEventData {
    /// The object affected by this event.
    pub object: Value,

    /// Previous values for updated fields (on update events).
    #[serde(default)]
    pub previous_attributes: Option<Value>,
}

impl StripeWebhookEvent {
    /// Parses a raw webhook body.
    ///
    /// Returns `None` unless the body is JSON with a non-empty `id` and `type`,
    /// a numeric `created`, and an object at `data.object`.
    pub fn parse(raw: &[u8]) -> Option<Self> {
        let event: StripeWebhookEvent = serde_json::from_slice(raw).ok()?;
        if event.id.trim().is_empty() || event.event_type.trim().is_empty() {
            return None;
        }
        if !event.data.object.is_object() {
            return None;
        }
        Some(event)
    }

    pub fn object(&self) -> &Value {
        &self.data.object
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Stripe Object Types
// ════════════════════════════════════════════════════════════════════════════════

/// Stripe Checkout Session object, as returned by the sessions API.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeCheckoutSession {
    /// Unique session identifier (cs_...).
    pub id: String,

    /// Session status (open, complete, expired).
    #[serde(default)]
    pub status: Option<String>,

    /// Session payment status (paid, unpaid, no_payment_required).
    #[serde(default)]
    pub payment_status: Option<String>,

    /// Payment mode (payment, setup, subscription).
    #[serde(default)]
    pub mode: Option<String>,

    /// Custom metadata attached to the session.
    #[serde(default)]
    pub metadata: HashMap<String, String>,

    /// Unix timestamp when the session was created.
    #[serde(default)]
    pub created: i64,

    #[serde(default)]
    pub amount_total: Option<i64>,

    #[serde(default)]
    pub currency: Option<String>,

    /// Customer id or expanded customer.
    #[serde(default)]
    pub customer: Option<Value>,

    /// Payment intent id or expanded payment intent.
    #[serde(default)]
    pub payment_intent: Option<Value>,

    /// Invoice id or expanded invoice (subscription mode).
    #[serde(default)]
    pub invoice: Option<Value>,

    /// Hosted checkout URL (only while open).
    #[serde(default)]
    pub url: Option<String>,

    /// Unix timestamp when an open session expires.
    #[serde(default)]
    pub expires_at: Option<i64>,
}

impl StripeCheckoutSession {
    pub fn is_paid(&self) -> bool {
        self.status.as_deref() == Some("complete") && self.payment_status.as_deref() == Some("paid")
    }

    pub fn is_subscription(&self) -> bool {
        self.mode.as_deref() == Some("subscription")
    }

    pub fn customer_id(&self) -> Option<String> {
        self.customer.as_ref().and_then(expandable_id)
    }

    /// Payment reference: payment intent, else invoice, else the session itself.
    pub fn transaction_id(&self) -> String {
        self.payment_intent
            .as_ref()
            .and_then(expandable_id)
            .or_else(|| self.invoice.as_ref().and_then(expandable_id))
            .unwrap_or_else(|| self.id.clone())
    }
}

/// Paginated list or search result.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeList<T> {
    pub data: Vec<T>,

    #[serde(default)]
    pub has_more: bool,

    /// Cursor for the next search page.
    #[serde(default)]
    pub next_page: Option<String>,
}

/// Billing portal session response.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripePortalSession {
    pub id: String,
    pub url: String,
}

/// Reads the id of an expandable field: either the string itself or the
/// `id` of the expanded object.
pub fn expandable_id(value: &Value) -> Option<String> {
    match value {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Object(map) => map
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string),
        _ => None,
    }
}
