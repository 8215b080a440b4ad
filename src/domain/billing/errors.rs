//! Error type for billing operations.
//!
//! Callers decide on HTTP status codes; this type only says what went wrong
//! and whether retrying can help.

use thiserror::Error;

use crate::domain::foundation::{DomainError, ErrorCode, ValidationError};
use crate::ports::PaymentError;

/// Errors returned by billing handlers.
#[derive(Debug, Error)]
pub enum BillingError {
    /// Webhook signature missing, stale or wrong. The body was not parsed.
    #[error("Invalid webhook signature")]
    InvalidSignature,

    /// A canonical event or command input failed validation.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Applying an event would produce an impossible projection.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Another writer updated the projection first.
    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),

    /// The user has no provider customer to open a billing portal for.
    #[error("No billing account for user")]
    NoBillingAccount,

    /// Payment provider call failed.
    #[error("Provider error: {0}")]
    Provider(#[from] PaymentError),

    /// Persistence failed.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl BillingError {
    /// Returns true if the same request may succeed when retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            BillingError::ConcurrentModification(_) | BillingError::Storage(_) => true,
            BillingError::Provider(err) => err.is_retryable(),
            BillingError::InvalidSignature
            | BillingError::Validation(_)
            | BillingError::InvariantViolation(_)
            | BillingError::NoBillingAccount => false,
        }
    }
}

impl From<DomainError> for BillingError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::ConcurrentModification => BillingError::ConcurrentModification(err.message),
            _ => BillingError::Storage(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::PaymentErrorCode;

    #[test]
    fn retryability_by_variant() {
        assert!(!BillingError::InvalidSignature.is_retryable());
        assert!(!BillingError::InvariantViolation("x".into()).is_retryable());
        assert!(!BillingError::NoBillingAccount.is_retryable());
        assert!(BillingError::ConcurrentModification("x".into()).is_retryable());
        assert!(BillingError::Storage("x".into()).is_retryable());
    }

    #[test]
    fn provider_retryability_follows_inner_error() {
        let network = BillingError::from(PaymentError::network("timeout"));
        assert!(network.is_retryable());

        let terminal = BillingError::from(PaymentError::new(
            PaymentErrorCode::InvalidRequest,
            "bad param",
        ));
        assert!(!terminal.is_retryable());
    }

    #[test]
    fn domain_concurrency_error_maps_to_concurrent_modification() {
        let err: BillingError = DomainError::concurrent_modification("version 3 expected").into();
        assert!(matches!(err, BillingError::ConcurrentModification(ref m) if m == "version 3 expected"));
    }

    #[test]
    fn other_domain_errors_map_to_storage() {
        let err: BillingError = DomainError::database("connection reset").into();
        assert!(matches!(err, BillingError::Storage(ref m) if m.contains("connection reset")));
    }
}
