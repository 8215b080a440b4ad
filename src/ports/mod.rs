//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Persistence Ports
//!
//! - `BillingStore` - Opens ledger transactions, reads committed state
//! - `LedgerTransaction` - Dedup lookups, append, projection lock and upsert
//!
//! ## Provider Ports
//!
//! - `BillingProvider` - Webhook verification and normalization, restore
//!   lookup, checkout and portal sessions
//!
//! ## Audit Ports
//!
//! - `BillingLogSink` - Append-only billing log

mod billing_log;
mod billing_provider;
mod billing_store;

pub use billing_log::{BillingLogEntry, BillingLogLevel, BillingLogSink};
pub use billing_provider::{
    BillingProvider, CheckoutSession, CompletedPurchase, CreateCheckoutRequest, PaymentError,
    PaymentErrorCode, PortalSession,
};
pub use billing_store::{BillingStore, InsertOutcome, LedgerTransaction};
