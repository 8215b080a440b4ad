//! Adapters - Implementations of port interfaces.
//!
//! - `stripe` - Stripe billing provider (HTTP, webhooks, mock)
//! - `postgres` - PostgreSQL ledger and entitlement storage
//! - `memory` - In-memory ledger store
//! - `logging` - Billing log sinks

pub mod logging;
pub mod memory;
pub mod postgres;
pub mod stripe;

pub use logging::{InMemoryLogSink, TracingLogSink};
pub use memory::InMemoryBillingStore;
pub use postgres::PostgresBillingStore;
pub use stripe::{MockBillingProvider, StripeBillingAdapter, StripeConfig};
