//! Billing log sink backed by `tracing`.

use crate::ports::{BillingLogEntry, BillingLogLevel, BillingLogSink};

/// Emits each entry as a `tracing` event on the `billing` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogSink;

impl TracingLogSink {
    pub fn new() -> Self {
        Self
    }
}

impl BillingLogSink for TracingLogSink {
    fn record(&self, entry: BillingLogEntry) {
        let fields = serde_json::to_string(&entry.fields).unwrap_or_default();
        match entry.level {
            BillingLogLevel::Info => {
                tracing::info!(target: "billing", at = %entry.at, fields = %fields, "{}", entry.message)
            }
            BillingLogLevel::Warn => {
                tracing::warn!(target: "billing", at = %entry.at, fields = %fields, "{}", entry.message)
            }
            BillingLogLevel::Error => {
                tracing::error!(target: "billing", at = %entry.at, fields = %fields, "{}", entry.message)
            }
        }
    }
}
