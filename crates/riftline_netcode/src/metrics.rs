//! # Metrics Sink
//!
//! Single-method capability the netcode reports to on every reconciliation,
//! overflow and prediction-error event.
//!
//! Correctness never depends on the sink. Components hold an
//! `Arc<dyn MetricsSink>` and default to [`NoopSink`].

use std::sync::Arc;

use parking_lot::Mutex;

/// One named numeric field of a metric payload.
pub type MetricField = (&'static str, f64);

/// Receiver of netcode metrics.
pub trait MetricsSink: Send + Sync {
    /// Records one occurrence of `name` with its payload.
    fn emit(&self, name: &'static str, fields: &[MetricField]);
}

/// Discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl MetricsSink for NoopSink {
    #[inline]
    fn emit(&self, _name: &'static str, _fields: &[MetricField]) {}
}

/// Forwards every metric to `tracing` at debug level.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl MetricsSink for TracingSink {
    fn emit(&self, name: &'static str, fields: &[MetricField]) {
        tracing::debug!(metric = name, ?fields, "netcode metric");
    }
}

/// A recorded metric occurrence.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricRecord {
    /// Metric name.
    pub name: &'static str,
    /// Payload.
    pub fields: Vec<MetricField>,
}

impl MetricRecord {
    /// Looks up a payload field by key.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<f64> {
        self.fields.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }
}

/// Keeps every metric in memory. Used by tests and the session summary.
#[derive(Debug, Default)]
pub struct RecordingSink {
    records: Mutex<Vec<MetricRecord>>,
}

impl RecordingSink {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of occurrences of `name`.
    #[must_use]
    pub fn count(&self, name: &str) -> usize {
        self.records.lock().iter().filter(|r| r.name == name).count()
    }

    /// Copy of every record so far, oldest first.
    #[must_use]
    pub fn records(&self) -> Vec<MetricRecord> {
        self.records.lock().clone()
    }

    /// Most recent occurrence of `name`.
    #[must_use]
    pub fn last(&self, name: &str) -> Option<MetricRecord> {
        self.records.lock().iter().rev().find(|r| r.name == name).cloned()
    }

    /// Forgets everything recorded so far.
    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl MetricsSink for RecordingSink {
    fn emit(&self, name: &'static str, fields: &[MetricField]) {
        self.records.lock().push(MetricRecord {
            name,
            fields: fields.to_vec(),
        });
    }
}

/// Shared no-op sink.
#[must_use]
pub fn noop() -> Arc<dyn MetricsSink> {
    Arc::new(NoopSink)
}
