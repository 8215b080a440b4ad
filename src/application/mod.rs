//! Application layer - Commands, Queries, and Handlers.
//!
//! This layer orchestrates domain operations and coordinates between ports.
//! Command handlers write through the ledger; query handlers only read.

pub mod handlers;

pub use handlers::billing::{
    // Commands
    AppendAndProjectHandler, AppendResult, DedupeReason,
    CreatePortalSessionCommand, CreatePortalSessionHandler,
    HandleBillingWebhookCommand, HandleBillingWebhookHandler, WebhookOutcome,
    RestorePurchaseCommand, RestorePurchaseHandler, RestorePurchaseResult,
    StartCheckoutCommand, StartCheckoutHandler, StartCheckoutResult,
    // Queries
    GetEntitlementHandler, GetEntitlementQuery, GetEntitlementResult,
    ReplayEntitlementHandler, ReplayEntitlementQuery, ReplayReport,
};
