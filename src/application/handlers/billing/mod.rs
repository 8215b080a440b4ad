//! Billing handlers.
//!
//! ## Commands
//! - Appending canonical events and projecting entitlements
//! - Processing provider webhooks
//! - Starting checkouts
//! - Restoring purchases
//! - Opening the billing portal
//!
//! ## Queries
//! - Reading an entitlement
//! - Verifying a projection by ledger replay

mod append_and_project;
mod create_portal_session;
mod get_entitlement;
mod handle_webhook;
mod replay_entitlement;
mod restore_purchase;
mod start_checkout;

#[cfg(test)]
pub(crate) mod test_support;

// Commands
pub use append_and_project::{AppendAndProjectHandler, AppendResult, DedupeReason};
pub use create_portal_session::{CreatePortalSessionCommand, CreatePortalSessionHandler};
pub use handle_webhook::{HandleBillingWebhookCommand, HandleBillingWebhookHandler, WebhookOutcome};
pub use restore_purchase::{
    RestorePurchaseCommand, RestorePurchaseHandler, RestorePurchaseResult, NO_PURCHASE_FOUND,
};
pub use start_checkout::{StartCheckoutCommand, StartCheckoutHandler, StartCheckoutResult};

// Queries
pub use get_entitlement::{GetEntitlementHandler, GetEntitlementQuery, GetEntitlementResult};
pub use replay_entitlement::{ReplayEntitlementHandler, ReplayEntitlementQuery, ReplayReport};
