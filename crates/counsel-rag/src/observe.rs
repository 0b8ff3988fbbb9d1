//! Dev-trace port: a no-op-by-default sink called at defined extension
//! points (cache updates, clarification transitions, retrieval results).
//! Production logging stays on `tracing`; this sink exists for structured
//! data capture during development and in tests.

use serde_json::Value;

pub trait TraceSink: Send + Sync {
    fn event(&self, stage: &'static str, name: &'static str, payload: Value);
}

/// Default sink: discards everything.
pub struct NoopSink;

impl TraceSink for NoopSink {
    fn event(&self, _stage: &'static str, _name: &'static str, _payload: Value) {}
}

/// Sink that forwards events to `tracing::debug!` for ad-hoc inspection.
pub struct LogSink;

impl TraceSink for LogSink {
    fn event(&self, stage: &'static str, name: &'static str, payload: Value) {
        tracing::debug!(stage = stage, name = name, payload = %payload, "trace event");
    }
}
