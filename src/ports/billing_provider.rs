//! Billing provider port.
//!
//! Defines the contract for payment provider integrations. Provider-specific
//! field names stay behind this boundary: webhooks come out as canonical
//! events and lookups come out as [`CompletedPurchase`].
//!
//! # Design
//!
//! - **Provider agnostic**: only canonical types cross the port
//! - **Verify before parse**: signature checks see raw bytes only
//! - **No retries**: callers decide based on [`PaymentError::is_retryable`]

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::billing::{CanonicalEvent, IdempotencyKey, PlanType, ProductKey, Provider};
use crate::domain::foundation::{DomainError, ErrorCode, Timestamp, UserId};

/// Port for payment provider integrations.
#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// Which provider this adapter speaks for.
    fn provider(&self) -> Provider;

    /// Verifies a webhook signature against the raw request body.
    fn verify_signature(&self, body: &[u8], signature_header: &str) -> bool;

    /// Maps a raw webhook body to at most one canonical event.
    ///
    /// Returns `None` for malformed bodies, unsupported event types, and
    /// events that do not reference a known user and product.
    fn normalize_webhook(&self, body: &[u8], received_at: Timestamp) -> Option<CanonicalEvent>;

    /// Finds the newest completed, paid purchase for a user and product.
    async fn find_completed_purchase(
        &self,
        user_id: &UserId,
        product_key: ProductKey,
    ) -> Result<Option<CompletedPurchase>, PaymentError>;

    /// Creates a hosted checkout session.
    async fn create_checkout_session(
        &self,
        request: CreateCheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError>;

    /// Creates a billing portal session for an existing customer.
    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<PortalSession, PaymentError>;
}

/// A purchase the provider reports as completed and paid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedPurchase {
    /// Provider's checkout session ID.
    pub session_id: String,

    /// Payment reference (payment intent, invoice or session).
    pub transaction_id: String,

    /// Provider's customer ID, if one was created.
    pub customer_id: Option<String>,

    pub amount_cents: i64,

    pub currency: String,

    pub plan_type: PlanType,

    /// When the session was created at the provider.
    pub created_at: Timestamp,
}

/// Request to create a checkout session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCheckoutRequest {
    /// Internal user ID (stored as metadata).
    pub user_id: UserId,

    pub product_key: ProductKey,

    /// Customer email for pre-fill.
    pub email: Option<String>,

    /// URL to redirect after successful checkout.
    pub success_url: String,

    /// URL to redirect after canceled checkout.
    pub cancel_url: String,

    /// Forwarded to the provider so a retried request reuses the session.
    pub idempotency_key: Option<IdempotencyKey>,
}

/// Checkout session for payment completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Provider's session ID.
    pub id: String,

    /// URL for customer to complete checkout.
    pub url: String,

    /// When the session expires.
    pub expires_at: Option<Timestamp>,
}

/// Portal session for billing management.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalSession {
    /// Provider's session ID.
    pub id: String,

    /// URL for customer to access portal.
    pub url: String,
}

/// Errors from payment provider operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentError {
    /// Error code for categorization.
    pub code: PaymentErrorCode,

    /// Human-readable message.
    pub message: String,

    /// Provider's error code (if available).
    pub provider_code: Option<String>,

    /// HTTP status returned by the provider, if the call got that far.
    pub status: Option<u16>,

    /// Whether the operation can be retried.
    pub retryable: bool,
}

impl PaymentError {
    /// Create a new payment error.
    pub fn new(code: PaymentErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider_code: None,
            status: None,
            retryable: code.is_retryable(),
        }
    }

    /// Classifies an HTTP error response.
    ///
    /// 429 and 5xx are retryable; 401/403 are authentication failures;
    /// 404 is not found; any other 4xx is a terminal request error.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let code = match status {
            401 | 403 => PaymentErrorCode::AuthenticationError,
            404 => PaymentErrorCode::NotFound,
            429 => PaymentErrorCode::RateLimitExceeded,
            500..=599 => PaymentErrorCode::ProviderUnavailable,
            _ => PaymentErrorCode::InvalidRequest,
        };
        let mut err = Self::new(code, message);
        err.status = Some(status);
        err
    }

    /// Create with provider code.
    pub fn with_provider_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::NetworkError, message)
    }

    /// Create a not found error.
    pub fn not_found(resource: &str) -> Self {
        Self::new(PaymentErrorCode::NotFound, format!("{} not found", resource))
    }

    /// Create an error for a response body that could not be understood.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::InvalidResponse, message)
    }

    /// Create an error for a missing or incomplete provider configuration.
    pub fn not_configured(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::NotConfigured, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }
}

impl std::fmt::Display for PaymentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for PaymentError {}

impl From<PaymentError> for DomainError {
    fn from(err: PaymentError) -> Self {
        let code = match err.code {
            PaymentErrorCode::NotFound => ErrorCode::NotFound,
            _ => ErrorCode::ExternalServiceError,
        };

        DomainError::new(code, err.message)
    }
}

/// Payment error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentErrorCode {
    /// Network connectivity issue or timeout.
    NetworkError,

    /// API authentication failed.
    AuthenticationError,

    /// Resource not found.
    NotFound,

    /// Rate limit exceeded.
    RateLimitExceeded,

    /// Provider returned a 5xx.
    ProviderUnavailable,

    /// Provider rejected the request (other 4xx).
    InvalidRequest,

    /// Response body did not have the expected shape.
    InvalidResponse,

    /// Required configuration (keys, price ids) is missing.
    NotConfigured,
}

impl PaymentErrorCode {
    /// Check if this error type is typically retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PaymentErrorCode::NetworkError
                | PaymentErrorCode::RateLimitExceeded
                | PaymentErrorCode::ProviderUnavailable
        )
    }
}

impl std::fmt::Display for PaymentErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentErrorCode::NetworkError => "network_error",
            PaymentErrorCode::AuthenticationError => "authentication_error",
            PaymentErrorCode::NotFound => "not_found",
            PaymentErrorCode::RateLimitExceeded => "rate_limit_exceeded",
            PaymentErrorCode::ProviderUnavailable => "provider_unavailable",
            PaymentErrorCode::InvalidRequest => "invalid_request",
            PaymentErrorCode::InvalidResponse => "invalid_response",
            PaymentErrorCode::NotConfigured => "not_configured",
        };
        write!(f, "{}", s)
    }
}
