//! Billing Ledger - Deduplicated billing event ledger
//!
//! Provider webhooks and client commands are normalized into canonical
//! billing events, appended once to an append-only ledger, and folded into
//! per-product entitlement projections that can always be rebuilt by replay.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
