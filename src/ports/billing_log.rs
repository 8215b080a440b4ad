//! BillingLogSink port - Append-only sink for billing audit lines.
//!
//! Handlers report what they did with each event (appended, deduplicated,
//! ignored, rejected) through this port so the audit trail can be routed to
//! tracing in production and captured in memory by tests.

use std::collections::BTreeMap;

use crate::domain::foundation::Timestamp;

/// Severity of a billing log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillingLogLevel {
    Info,
    Warn,
    Error,
}

/// One structured billing log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingLogEntry {
    pub at: Timestamp,
    pub level: BillingLogLevel,
    pub message: String,
    pub fields: BTreeMap<String, String>,
}

impl BillingLogEntry {
    pub fn new(level: BillingLogLevel, message: impl Into<String>) -> Self {
        Self {
            at: Timestamp::now(),
            level,
            message: message.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(BillingLogLevel::Info, message)
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self::new(BillingLogLevel::Warn, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(BillingLogLevel::Error, message)
    }

    /// Adds a structured field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.fields.insert(key.into(), value.to_string());
        self
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

/// Port for recording billing log entries. Must never fail the caller.
pub trait BillingLogSink: Send + Sync {
    fn record(&self, entry: BillingLogEntry);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_collects_fields() {
        let entry = BillingLogEntry::info("appended")
            .with_field("event_id", "stripe:evt_1:refund_issued")
            .with_field("version", 3);

        assert_eq!(entry.level, BillingLogLevel::Info);
        assert_eq!(entry.field("version"), Some("3"));
        assert_eq!(entry.field("missing"), None);
    }
}
