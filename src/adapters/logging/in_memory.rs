//! Bounded in-memory billing log for tests.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use crate::ports::{BillingLogEntry, BillingLogSink};

/// Default number of retained entries.
const DEFAULT_CAPACITY: usize = 1_000;

/// Keeps the most recent entries; older ones are dropped first.
#[derive(Debug)]
pub struct InMemoryLogSink {
    entries: Mutex<VecDeque<BillingLogEntry>>,
    capacity: usize,
}

impl InMemoryLogSink {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY))),
            capacity: capacity.max(1),
        }
    }

    /// Snapshot of retained entries, oldest first.
    pub fn entries(&self) -> Vec<BillingLogEntry> {
        self.lock().iter().cloned().collect()
    }

    /// Retained entries whose message equals `message`.
    pub fn with_message(&self, message: &str) -> Vec<BillingLogEntry> {
        self.lock()
            .iter()
            .filter(|e| e.message == message)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<BillingLogEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for InMemoryLogSink {
    fn default() -> Self {
        Self::new()
    }
}

impl BillingLogSink for InMemoryLogSink {
    fn record(&self, entry: BillingLogEntry) {
        let mut entries = self.lock();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_entries_in_order() {
        let sink = InMemoryLogSink::new();
        sink.record(BillingLogEntry::info("first"));
        sink.record(BillingLogEntry::warn("second"));

        let messages: Vec<_> = sink.entries().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["first", "second"]);
    }

    #[test]
    fn drops_oldest_when_full() {
        let sink = InMemoryLogSink::with_capacity(2);
        sink.record(BillingLogEntry::info("a"));
        sink.record(BillingLogEntry::info("b"));
        sink.record(BillingLogEntry::info("c"));

        assert_eq!(sink.len(), 2);
        assert!(sink.with_message("a").is_empty());
        assert_eq!(sink.with_message("c").len(), 1);
    }
}
