//! Stripe billing provider adapter.
//!
//! Implements the `BillingProvider` port for the Stripe API: webhook
//! verification and normalization, completed-purchase lookup for restores,
//! and checkout/portal session creation.
//!
//! # Security
//!
//! - HMAC-SHA256 signature verification with constant-time comparison
//! - Symmetric timestamp tolerance for replay protection
//! - Secrets handled via `secrecy::SecretString`
//!
//! # Configuration
//!
//! ```ignore
//! let config = StripeConfig::new(api_key, webhook_secret)
//!     .with_price_id(ProductKey::Lifetime, "price_123");
//! let adapter = StripeBillingAdapter::new(config);
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;

use super::normalizer::{self, METADATA_PRODUCT_KEY, METADATA_USER_ID};
use super::webhook_types::{StripeCheckoutSession, StripeList, StripePortalSession, StripeWebhookEvent};
use crate::domain::billing::{
    verify_signature, CanonicalEvent, PlanType, ProductKey, Provider,
};
use crate::domain::billing::webhook_verifier::DEFAULT_TOLERANCE_SECS;
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::{
    BillingProvider, CheckoutSession, CompletedPurchase, CreateCheckoutRequest, PaymentError,
    PortalSession,
};

/// Page size for session listing (Stripe maximum).
const PAGE_LIMIT: &str = "100";

/// Stripe API configuration.
#[derive(Clone)]
pub struct StripeConfig {
    /// Stripe secret API key (sk_live_... or sk_test_...).
    api_key: SecretString,

    /// Webhook signing secret (whsec_...).
    webhook_secret: SecretString,

    /// Base URL for Stripe API (default: https://api.stripe.com).
    api_base_url: String,

    /// Allowed distance between the signed timestamp and now.
    signature_tolerance_secs: i64,

    /// Stripe price per product.
    price_ids: HashMap<ProductKey, String>,

    /// Upper bound on pages scanned by the list fallback.
    restore_max_pages: u32,

    /// Whether to drop test-mode events.
    require_livemode: bool,
}

impl StripeConfig {
    /// Create a new Stripe configuration.
    pub fn new(api_key: SecretString, webhook_secret: SecretString) -> Self {
        Self {
            api_key,
            webhook_secret,
            api_base_url: "https://api.stripe.com".to_string(),
            signature_tolerance_secs: DEFAULT_TOLERANCE_SECS,
            price_ids: HashMap::new(),
            restore_max_pages: 5,
            require_livemode: false,
        }
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    pub fn with_signature_tolerance(mut self, secs: i64) -> Self {
        self.signature_tolerance_secs = secs;
        self
    }

    pub fn with_price_id(mut self, product: ProductKey, price_id: impl Into<String>) -> Self {
        self.price_ids.insert(product, price_id.into());
        self
    }

    pub fn with_restore_max_pages(mut self, pages: u32) -> Self {
        self.restore_max_pages = pages.max(1);
        self
    }

    /// Require livemode events in production.
    pub fn with_require_livemode(mut self, require: bool) -> Self {
        self.require_livemode = require;
        self
    }
}

/// Stripe billing provider adapter.
pub struct StripeBillingAdapter {
    config: StripeConfig,
    http_client: reqwest::Client,
}

impl StripeBillingAdapter {
    /// Create a new Stripe adapter with the given configuration.
    pub fn new(config: StripeConfig) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url.trim_end_matches('/'), path)
    }

    /// Sends a request and decodes a successful JSON response.
    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        operation: &'static str,
    ) -> Result<T, PaymentError> {
        let response = request
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .send()
            .await
            .map_err(|e| PaymentError::network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::warn!(
                operation,
                status = status.as_u16(),
                error = %error_text,
                "Stripe API call failed"
            );
            return Err(PaymentError::from_status(
                status.as_u16(),
                format!("Stripe API error: {}", error_text),
            ));
        }

        response.json().await.map_err(|e| {
            PaymentError::invalid_response(format!("Failed to parse Stripe response: {}", e))
        })
    }

    /// Searches sessions by metadata. Not every account has search enabled.
    async fn search_sessions(
        &self,
        user_id: &UserId,
        product_key: ProductKey,
    ) -> Result<Vec<StripeCheckoutSession>, PaymentError> {
        let query = format!(
            "metadata['{}']:'{}' AND metadata['{}']:'{}'",
            METADATA_USER_ID,
            escape_search_value(user_id.as_str()),
            METADATA_PRODUCT_KEY,
            product_key.as_str()
        );

        let request = self
            .http_client
            .get(self.url("/v1/checkout/sessions/search"))
            .query(&[("query", query.as_str()), ("limit", PAGE_LIMIT)]);

        let page: StripeList<StripeCheckoutSession> = self.send(request, "search_sessions").await?;
        Ok(page.data)
    }

    /// Walks the session list newest-first, up to `restore_max_pages` pages.
    async fn list_sessions(&self) -> Result<Vec<StripeCheckoutSession>, PaymentError> {
        let mut sessions = Vec::new();
        let mut starting_after: Option<String> = None;

        for _ in 0..self.config.restore_max_pages {
            let mut params = vec![("limit", PAGE_LIMIT.to_string()), ("status", "complete".to_string())];
            if let Some(cursor) = &starting_after {
                params.push(("starting_after", cursor.clone()));
            }

            let request = self
                .http_client
                .get(self.url("/v1/checkout/sessions"))
                .query(&params);

            let page: StripeList<StripeCheckoutSession> = self.send(request, "list_sessions").await?;
            starting_after = page.data.last().map(|s| s.id.clone());
            sessions.extend(page.data);

            if !page.has_more || starting_after.is_none() {
                break;
            }
        }

        Ok(sessions)
    }
}

/// Escapes a value for a Stripe search query string literal.
fn escape_search_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Picks the newest paid session belonging to the user and product.
fn newest_completed(
    sessions: Vec<StripeCheckoutSession>,
    user_id: &UserId,
    product_key: ProductKey,
) -> Option<CompletedPurchase> {
    sessions
        .into_iter()
        .filter(|s| {
            s.is_paid()
                && s.metadata.get(METADATA_USER_ID).map(String::as_str) == Some(user_id.as_str())
                && s.metadata.get(METADATA_PRODUCT_KEY).map(String::as_str)
                    == Some(product_key.as_str())
        })
        .filter_map(|s| to_completed_purchase(s, product_key))
        .max_by_key(|p| p.created_at)
}

fn to_completed_purchase(
    session: StripeCheckoutSession,
    product_key: ProductKey,
) -> Option<CompletedPurchase> {
    let plan_type = if session.is_subscription() {
        PlanType::Subscription
    } else {
        product_key.default_plan_type()
    };

    Some(CompletedPurchase {
        transaction_id: session.transaction_id(),
        customer_id: session.customer_id(),
        amount_cents: session.amount_total.unwrap_or(0),
        currency: session.currency.clone()?,
        plan_type,
        created_at: Timestamp::from_unix_secs(session.created)?,
        session_id: session.id,
    })
}

#[async_trait]
impl BillingProvider for StripeBillingAdapter {
    fn provider(&self) -> Provider {
        Provider::Stripe
    }

    fn verify_signature(&self, body: &[u8], signature_header: &str) -> bool {
        let valid = verify_signature(
            body,
            signature_header,
            self.config.webhook_secret.expose_secret(),
            self.config.signature_tolerance_secs,
        );
        if !valid {
            tracing::warn!("Stripe webhook signature rejected");
        }
        valid
    }

    fn normalize_webhook(&self, body: &[u8], received_at: Timestamp) -> Option<CanonicalEvent> {
        let event = StripeWebhookEvent::parse(body)?;

        if self.config.require_livemode && !event.livemode {
            tracing::warn!(event_id = %event.id, "Rejected test mode event in production");
            return None;
        }

        let mut canonical = normalizer::normalize(&event, received_at)?;
        canonical.payload_hash = Some(normalizer::payload_hash(body));
        Some(canonical)
    }

    async fn find_completed_purchase(
        &self,
        user_id: &UserId,
        product_key: ProductKey,
    ) -> Result<Option<CompletedPurchase>, PaymentError> {
        let sessions = match self.search_sessions(user_id, product_key).await {
            Ok(sessions) => sessions,
            Err(err) if matches!(err.status, Some(400) | Some(404)) => {
                tracing::info!(
                    user_id = %user_id,
                    product_key = %product_key,
                    "Session search unavailable, falling back to list"
                );
                self.list_sessions().await?
            }
            Err(err) => return Err(err),
        };

        Ok(newest_completed(sessions, user_id, product_key))
    }

    async fn create_checkout_session(
        &self,
        request: CreateCheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        let price_id = self.config.price_ids.get(&request.product_key).ok_or_else(|| {
            PaymentError::not_configured(format!(
                "No Stripe price configured for {}",
                request.product_key
            ))
        })?;

        let plan_type = request.product_key.default_plan_type();
        let mode = if plan_type.is_subscription() {
            "subscription"
        } else {
            "payment"
        };

        let mut params = vec![
            ("mode", mode.to_string()),
            ("line_items[0][price]", price_id.clone()),
            ("line_items[0][quantity]", "1".to_string()),
            ("success_url", request.success_url),
            ("cancel_url", request.cancel_url),
            ("client_reference_id", request.user_id.to_string()),
            ("metadata[user_id]", request.user_id.to_string()),
            ("metadata[product_key]", request.product_key.to_string()),
            ("metadata[plan_type]", plan_type.to_string()),
        ];

        // Refunds and disputes arrive on charges, so the reference has to
        // travel with the payment as well.
        if plan_type.is_subscription() {
            params.push(("subscription_data[metadata][user_id]", request.user_id.to_string()));
            params.push((
                "subscription_data[metadata][product_key]",
                request.product_key.to_string(),
            ));
        } else {
            params.push(("payment_intent_data[metadata][user_id]", request.user_id.to_string()));
            params.push((
                "payment_intent_data[metadata][product_key]",
                request.product_key.to_string(),
            ));
        }

        if let Some(email) = request.email {
            params.push(("customer_email", email));
        }

        let mut http = self
            .http_client
            .post(self.url("/v1/checkout/sessions"))
            .form(&params);
        if let Some(key) = &request.idempotency_key {
            http = http.header("Idempotency-Key", key.as_str());
        }

        let session: StripeCheckoutSession = self.send(http, "create_checkout_session").await?;

        let url = session
            .url
            .clone()
            .ok_or_else(|| PaymentError::invalid_response("Checkout session has no url"))?;

        Ok(CheckoutSession {
            id: session.id,
            url,
            expires_at: session.expires_at.and_then(Timestamp::from_unix_secs),
        })
    }

    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<PortalSession, PaymentError> {
        let request = self
            .http_client
            .post(self.url("/v1/billing_portal/sessions"))
            .form(&[("customer", customer_id), ("return_url", return_url)]);

        let portal: StripePortalSession = self.send(request, "create_portal_session").await?;

        Ok(PortalSession {
            id: portal.id,
            url: portal.url,
        })
    }
}
