//! The injectable metrics recorder.
//!
//! The pipeline records through an opaque [`MetricsSink`] so that the core
//! has no opinion about the metrics backend. [`NoopSink`] is the default;
//! [`FacadeSink`] forwards to the `metrics` crate facade for users who
//! already run a recorder (Prometheus exporter, statsd bridge, ...).

use std::sync::Arc;

/// Metric names recorded by the pipeline.
pub mod names {
    pub const REQUEST_DURATION: &str = "request.duration";
    pub const REQUEST_BODY_SIZE: &str = "request.body.size";
    pub const RESPONSE_BODY_SIZE: &str = "response.body.size";
    pub const TTFB: &str = "ttfb";
    pub const RETRY_DURATION: &str = "retry.duration";
    pub const RETRY_ATTEMPTS: &str = "retry.attempts";
    pub const RETRY_EXHAUSTED: &str = "retry.exhausted";
    pub const ACTIVE_REQUESTS: &str = "active_requests";
    pub const CIRCUIT_BREAKER_STATE: &str = "circuit_breaker.state";
    pub const RATE_LIMIT_WAIT: &str = "rate_limit.wait";
    pub const COALESCE_JOINED: &str = "coalesce.joined";
    pub const HEDGE_LAUNCHED: &str = "hedge.launched";
    pub const CHAOS_INJECTED: &str = "chaos.injected";
}

/// An opaque counter/histogram/gauge recorder.
///
/// Implementations must be cheap: the pipeline records on the hot path.
pub trait MetricsSink: Send + Sync {
    fn counter(&self, name: &str, labels: &[(&'static str, &str)], value: u64);
    fn histogram(&self, name: &str, labels: &[(&'static str, &str)], value: f64);
    fn gauge(&self, name: &str, labels: &[(&'static str, &str)], value: f64);
}

/// Discards every record. The default when no sink is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn counter(&self, _name: &str, _labels: &[(&'static str, &str)], _value: u64) {}
    fn histogram(&self, _name: &str, _labels: &[(&'static str, &str)], _value: f64) {}
    fn gauge(&self, _name: &str, _labels: &[(&'static str, &str)], _value: f64) {}
}

/// Forwards records to the `metrics` crate facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct FacadeSink;

fn to_labels(labels: &[(&'static str, &str)]) -> Vec<metrics::Label> {
    labels
        .iter()
        .map(|(key, value)| metrics::Label::new(*key, value.to_string()))
        .collect()
}

impl MetricsSink for FacadeSink {
    fn counter(&self, name: &str, labels: &[(&'static str, &str)], value: u64) {
        metrics::counter!(name.to_string(), to_labels(labels)).increment(value);
    }

    fn histogram(&self, name: &str, labels: &[(&'static str, &str)], value: f64) {
        metrics::histogram!(name.to_string(), to_labels(labels)).record(value);
    }

    fn gauge(&self, name: &str, labels: &[(&'static str, &str)], value: f64) {
        metrics::gauge!(name.to_string(), to_labels(labels)).set(value);
    }
}

/// Shared handle to a sink; `None`-like behavior is expressed with
/// [`NoopSink`] rather than an `Option` on the hot path.
pub type SharedSink = Arc<dyn MetricsSink>;

/// The no-op sink as a shared handle.
pub fn noop_sink() -> SharedSink {
    Arc::new(NoopSink)
}
