//! Stripe billing provider adapter.
//!
//! Implements the `BillingProvider` port for Stripe, including:
//! - Webhook signature verification
//! - Webhook normalization into canonical billing events
//! - Completed-purchase lookup for restores
//! - Checkout and billing portal sessions
//!
//! # Security
//!
//! - Webhook signatures use HMAC-SHA256 with constant-time comparison
//! - Timestamps are validated against a configurable tolerance (default 5 minutes)
//! - All secrets are handled via `secrecy::SecretString`

mod mock_billing_provider;
pub mod normalizer;
mod stripe_adapter;
mod webhook_types;

pub use mock_billing_provider::{MethodCall, MockBillingProvider};
pub use stripe_adapter::{StripeBillingAdapter, StripeConfig};
pub use webhook_types::{expandable_id, StripeCheckoutSession, StripeList, StripeWebhookEvent};
