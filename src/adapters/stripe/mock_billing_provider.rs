//! Mock billing provider for testing.
//!
//! Provides a configurable implementation of `BillingProvider` for unit and
//! integration tests. Supports:
//! - Real HMAC verification against a test secret, or fixed accept/reject
//! - Stripe-shaped webhook bodies, normalized by the real normalizer
//! - Pre-configured restore lookups, checkout and portal sessions
//! - Error injection and call tracking

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::normalizer;
use crate::domain::billing::{verify_signature, CanonicalEvent, ProductKey, Provider};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::{
    BillingProvider, CheckoutSession, CompletedPurchase, CreateCheckoutRequest, PaymentError,
    PortalSession,
};

/// Mock billing provider for testing.
///
/// # Example
///
/// ```ignore
/// let mock = MockBillingProvider::new();
/// mock.set_completed_purchase(&user_id, ProductKey::Lifetime, purchase);
/// mock.set_method_error("find_completed_purchase", PaymentError::network("down"));
/// ```
#[derive(Default)]
pub struct MockBillingProvider {
    /// Inner state (thread-safe for async tests).
    inner: Arc<Mutex<MockState>>,
}

/// Internal mutable state.
#[derive(Default)]
struct MockState {
    /// Restore lookup results by (user, product).
    completed_purchases: HashMap<(String, ProductKey), CompletedPurchase>,

    /// Checkout session to return.
    next_checkout: Option<CheckoutSession>,

    /// Portal session to return.
    next_portal: Option<PortalSession>,

    /// Specific errors by method name.
    method_errors: HashMap<String, PaymentError>,

    /// Track method calls for assertions.
    call_log: Vec<MethodCall>,

    /// Webhook verification behavior.
    verify_mode: VerifyMode,
}

/// Recorded method call for assertions.
#[derive(Debug, Clone)]
pub struct MethodCall {
    pub method: String,
    pub args: Vec<String>,
}

/// How to handle webhook verification.
#[derive(Default, Clone)]
enum VerifyMode {
    /// Accept any signature.
    #[default]
    AcceptAll,

    /// Verify with HMAC against this secret and tolerance.
    Secret { secret: String, tolerance_secs: i64 },

    /// Always fail verification.
    AlwaysFail,
}

impl MockBillingProvider {
    /// Create a new mock provider that accepts every signature.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock that verifies signatures against `secret`.
    pub fn with_webhook_secret(secret: impl Into<String>, tolerance_secs: i64) -> Self {
        let mock = Self::new();
        mock.state().verify_mode = VerifyMode::Secret {
            secret: secret.into(),
            tolerance_secs,
        };
        mock
    }

    /// Create a mock that fails all webhook verifications.
    pub fn rejecting_webhooks() -> Self {
        let mock = Self::new();
        mock.state().verify_mode = VerifyMode::AlwaysFail;
        mock
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Configuration Methods
    // ════════════════════════════════════════════════════════════════════════════

    /// Set the purchase returned by `find_completed_purchase` for a user/product.
    pub fn set_completed_purchase(
        &self,
        user_id: &UserId,
        product_key: ProductKey,
        purchase: CompletedPurchase,
    ) {
        self.state()
            .completed_purchases
            .insert((user_id.to_string(), product_key), purchase);
    }

    /// Set the checkout session to return.
    pub fn set_checkout_session(&self, session: CheckoutSession) {
        self.state().next_checkout = Some(session);
    }

    /// Set the portal session to return.
    pub fn set_portal_session(&self, session: PortalSession) {
        self.state().next_portal = Some(session);
    }

    /// Set an error for a specific method.
    pub fn set_method_error(&self, method: &str, error: PaymentError) {
        self.state().method_errors.insert(method.to_string(), error);
    }

    /// Clear all configured errors.
    pub fn clear_errors(&self) {
        self.state().method_errors.clear();
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Call Tracking
    // ════════════════════════════════════════════════════════════════════════════

    /// Get all recorded method calls.
    pub fn calls(&self) -> Vec<MethodCall> {
        self.state().call_log.clone()
    }

    /// Check if a method was called.
    pub fn was_called(&self, method: &str) -> bool {
        self.call_count(method) > 0
    }

    /// Get count of calls to a method.
    pub fn call_count(&self, method: &str) -> usize {
        self.state()
            .call_log
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Internal Helpers
    // ════════════════════════════════════════════════════════════════════════════

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_call(&self, method: &str, args: Vec<String>) {
        self.state().call_log.push(MethodCall {
            method: method.to_string(),
            args,
        });
    }

    fn check_error(&self, method: &str) -> Result<(), PaymentError> {
        match self.state().method_errors.get(method) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

impl Clone for MockBillingProvider {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl BillingProvider for MockBillingProvider {
    fn provider(&self) -> Provider {
        Provider::Stripe
    }

    fn verify_signature(&self, body: &[u8], signature_header: &str) -> bool {
        self.record_call("verify_signature", vec![signature_header.to_string()]);
        let mode = self.state().verify_mode.clone();
        match mode {
            VerifyMode::AcceptAll => true,
            VerifyMode::AlwaysFail => false,
            VerifyMode::Secret {
                secret,
                tolerance_secs,
            } => verify_signature(body, signature_header, &secret, tolerance_secs),
        }
    }

    fn normalize_webhook(&self, body: &[u8], received_at: Timestamp) -> Option<CanonicalEvent> {
        self.record_call("normalize_webhook", Vec::new());
        normalizer::normalize_body(body, received_at)
    }

    async fn find_completed_purchase(
        &self,
        user_id: &UserId,
        product_key: ProductKey,
    ) -> Result<Option<CompletedPurchase>, PaymentError> {
        self.record_call(
            "find_completed_purchase",
            vec![user_id.to_string(), product_key.to_string()],
        );
        self.check_error("find_completed_purchase")?;

        Ok(self
            .state()
            .completed_purchases
            .get(&(user_id.to_string(), product_key))
            .cloned())
    }

    async fn create_checkout_session(
        &self,
        request: CreateCheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        self.record_call(
            "create_checkout_session",
            vec![
                request.user_id.to_string(),
                request.product_key.to_string(),
                request
                    .idempotency_key
                    .as_ref()
                    .map(|k| k.to_string())
                    .unwrap_or_default(),
            ],
        );
        self.check_error("create_checkout_session")?;

        let configured = self.state().next_checkout.clone();
        Ok(configured.unwrap_or_else(|| {
            let id = format!("cs_mock_{}", request.user_id);
            CheckoutSession {
                url: format!("https://checkout.example.test/{}", id),
                id,
                expires_at: None,
            }
        }))
    }

    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<PortalSession, PaymentError> {
        self.record_call(
            "create_portal_session",
            vec![customer_id.to_string(), return_url.to_string()],
        );
        self.check_error("create_portal_session")?;

        let configured = self.state().next_portal.clone();
        Ok(configured.unwrap_or_else(|| PortalSession {
            id: format!("bps_mock_{}", customer_id),
            url: format!("https://billing.example.test/{}", customer_id),
        }))
    }
}

/// Test fixtures.
impl MockBillingProvider {
    /// A paid one-off purchase as the restore lookup would report it.
    pub fn completed_purchase(session_id: &str, created_at: Timestamp) -> CompletedPurchase {
        CompletedPurchase {
            session_id: session_id.to_string(),
            transaction_id: format!("pi_{}", session_id),
            customer_id: Some("cus_mock".to_string()),
            amount_cents: 4900,
            currency: "usd".to_string(),
            plan_type: crate::domain::billing::PlanType::OneTime,
            created_at,
        }
    }
}
