//! Billing domain module.
//!
//! Canonical billing events, the entitlement projection derived from them,
//! and the pure rules connecting the two.
//!
//! # Module Structure
//!
//! - `catalog` - Provider, product and plan enums
//! - `event` - Canonical event model and ledger rows
//! - `validation` - Structural event validation
//! - `idempotency` - Command dedupe keys
//! - `entitlement` - Entitlement projection and its invariants
//! - `projector` - Event application and replay
//! - `webhook_verifier` - HMAC signature verification
//! - `errors` - Billing error type

mod catalog;
mod entitlement;
mod errors;
mod event;
pub mod idempotency;
pub mod projector;
pub mod validation;
pub mod webhook_verifier;

pub use catalog::{PlanType, ProductKey, Provider};
pub use entitlement::{EntitlementProjection, EntitlementStatus};
pub use errors::BillingError;
pub use event::{
    CanonicalEvent, EventId, EventPayload, EventType, LedgerEvent, RestoreOrigin,
    SubscriptionPeriod,
};
pub use idempotency::{build_command_dedupe_key, IdempotencyKey};
pub use validation::{validate_event, validate_payload};
pub use webhook_verifier::{verify_signature, verify_signature_at, WebhookSignatureVerifier};
