//! Configuration for the circuit breaker.

use crate::circuit::{CircuitState, Counts};
use crate::events::CircuitBreakerEvent;
use crate::store::SharedStore;
use crate::BreakerLayer;
use granite_core::metrics::{noop_sink, SharedSink};
use granite_core::{
    DefaultFailureClassifier, Error, EventListeners, FailureClassifier, FnFailureClassifier,
    FnListener, HttpResponse,
};
use std::sync::Arc;
use std::time::Duration;

/// Decides when a closed circuit should trip, given the current window.
pub type TripRule = Arc<dyn Fn(&Counts) -> bool + Send + Sync>;

/// Callback invoked on every state transition.
pub type StateChangeHook = Arc<dyn Fn(CircuitState, CircuitState) + Send + Sync>;

/// Configuration for the circuit breaker middleware.
///
/// One breaker instance is created per operation name; all of them share
/// this configuration.
pub struct BreakerConfig {
    pub(crate) open_timeout: Duration,
    pub(crate) probe_requests: u64,
    pub(crate) interval: Duration,
    pub(crate) ready_to_trip: TripRule,
    pub(crate) classifier: Arc<dyn FailureClassifier>,
    pub(crate) store: Option<Arc<dyn SharedStore>>,
    pub(crate) event_listeners: EventListeners<CircuitBreakerEvent>,
    pub(crate) on_state_change: Option<StateChangeHook>,
    pub(crate) sink: SharedSink,
}

impl BreakerConfig {
    pub fn builder() -> BreakerConfigBuilder {
        BreakerConfigBuilder::new()
    }
}

/// Builder for [`BreakerConfig`].
///
/// Defaults:
/// - trip when `consecutive_failures >= 5`, or when `requests >= 20` and
///   the failure ratio reaches `0.5`
/// - `open_timeout`: 10 s
/// - `probe_requests`: 1
/// - counter window cleared every 10 s while closed
/// - classifier: [`DefaultFailureClassifier`] (5xx and transport errors
///   count; 429 and other 4xx do not)
pub struct BreakerConfigBuilder {
    failure_threshold: u64,
    min_requests: u64,
    failure_ratio: f64,
    open_timeout: Duration,
    probe_requests: u64,
    interval: Duration,
    ready_to_trip: Option<TripRule>,
    classifier: Option<Arc<dyn FailureClassifier>>,
    store: Option<Arc<dyn SharedStore>>,
    event_listeners: EventListeners<CircuitBreakerEvent>,
    on_state_change: Option<StateChangeHook>,
    sink: SharedSink,
}

impl Default for BreakerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BreakerConfigBuilder {
    pub fn new() -> Self {
        Self {
            failure_threshold: 5,
            min_requests: 20,
            failure_ratio: 0.5,
            open_timeout: Duration::from_secs(10),
            probe_requests: 1,
            interval: Duration::from_secs(10),
            ready_to_trip: None,
            classifier: None,
            store: None,
            event_listeners: EventListeners::new(),
            on_state_change: None,
            sink: noop_sink(),
        }
    }

    /// Consecutive failures that trip the default rule.
    pub fn failure_threshold(mut self, threshold: u64) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    /// Minimum requests in the window before the ratio rule applies.
    pub fn min_requests(mut self, min_requests: u64) -> Self {
        self.min_requests = min_requests.max(1);
        self
    }

    /// Failure ratio that trips the default rule once `min_requests` is met.
    pub fn failure_ratio(mut self, ratio: f64) -> Self {
        self.failure_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    /// How long the circuit stays open before probing.
    pub fn open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }

    /// Consecutive half-open successes required to close; also the bound on
    /// concurrent half-open probes.
    pub fn probe_requests(mut self, probes: u64) -> Self {
        self.probe_requests = probes.max(1);
        self
    }

    /// Period after which the closed-state counter window is cleared.
    /// Zero disables clearing.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Replaces the trip rule entirely.
    pub fn ready_to_trip<F>(mut self, rule: F) -> Self
    where
        F: Fn(&Counts) -> bool + Send + Sync + 'static,
    {
        self.ready_to_trip = Some(Arc::new(rule));
        self
    }

    /// Replaces the breaker failure classifier.
    pub fn failure_classifier<F>(mut self, f: F) -> Self
    where
        F: Fn(&Result<HttpResponse, Error>) -> bool + Send + Sync + 'static,
    {
        self.classifier = Some(Arc::new(FnFailureClassifier::new(f)));
        self
    }

    /// Shares breaker counters through a distributed store. Store failures
    /// degrade the breaker to local counting; they never fail the client.
    pub fn store(mut self, store: Arc<dyn SharedStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Callback invoked on every state transition with `(from, to)`.
    pub fn on_state_change<F>(mut self, f: F) -> Self
    where
        F: Fn(CircuitState, CircuitState) + Send + Sync + 'static,
    {
        self.on_state_change = Some(Arc::new(f));
        self
    }

    /// Callback invoked when an open or saturated half-open circuit rejects
    /// a call.
    pub fn on_call_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if matches!(event, CircuitBreakerEvent::CallRejected { .. }) {
                f();
            }
        }));
        self
    }

    /// Registers a raw event listener.
    pub fn listener<L>(mut self, listener: L) -> Self
    where
        L: granite_core::EventListener<CircuitBreakerEvent> + 'static,
    {
        self.event_listeners.add(listener);
        self
    }

    /// Metrics sink for the `circuit_breaker.state` gauge.
    pub fn sink(mut self, sink: SharedSink) -> Self {
        self.sink = sink;
        self
    }

    pub(crate) fn into_config(self) -> BreakerConfig {
        let threshold = self.failure_threshold;
        let min_requests = self.min_requests;
        let ratio = self.failure_ratio;
        let ready_to_trip = self.ready_to_trip.unwrap_or_else(|| {
            Arc::new(move |counts: &Counts| {
                counts.consecutive_failures >= threshold
                    || (counts.requests >= min_requests && counts.failure_ratio() >= ratio)
            })
        });

        BreakerConfig {
            open_timeout: self.open_timeout,
            probe_requests: self.probe_requests,
            interval: self.interval,
            ready_to_trip,
            classifier: self
                .classifier
                .unwrap_or_else(|| Arc::new(DefaultFailureClassifier)),
            store: self.store,
            event_listeners: self.event_listeners,
            on_state_change: self.on_state_change,
            sink: self.sink,
        }
    }

    /// Builds the breaker layer.
    pub fn build(self) -> BreakerLayer {
        BreakerLayer::new(self.into_config())
    }
}
