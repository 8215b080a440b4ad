//! Billing log sinks.
//!
//! - `TracingLogSink` - Forwards entries to `tracing`
//! - `InMemoryLogSink` - Bounded buffer for tests

mod in_memory;
mod tracing_sink;

pub use in_memory::InMemoryLogSink;
pub use tracing_sink::TracingLogSink;
