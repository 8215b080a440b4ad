//! PostgreSQL adapters - Database implementations for persistence ports.
//!
//! This module provides adapters for PostgreSQL-backed persistence:
//! - `PostgresBillingStore` - Ledger and entitlement storage
//! - `PostgresLedgerTransaction` - One append-and-project unit of work

mod billing_store;

pub use billing_store::{PostgresBillingStore, PostgresLedgerTransaction, MIGRATOR};
