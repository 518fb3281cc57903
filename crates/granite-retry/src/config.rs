//! Configuration for the retry engine.

use crate::backoff::{BackoffStrategy, ExponentialBackoff};
use crate::events::RetryEvent;
use crate::RetryLayer;
use granite_core::metrics::{noop_sink, SharedSink};
use granite_core::{
    DefaultClassifier, EventListeners, FnClassifier, FnListener, ResultClassifier, Verdict,
};
use granite_core::{Error, HttpResponse};
use std::sync::Arc;
use std::time::Duration;

/// Configuration for the retry middleware.
pub struct RetryConfig {
    pub(crate) max_retries: usize,
    pub(crate) max_elapsed_time: Option<Duration>,
    pub(crate) backoff: Box<dyn BackoffStrategy>,
    pub(crate) classifier: Arc<dyn ResultClassifier>,
    pub(crate) event_listeners: EventListeners<RetryEvent>,
    pub(crate) sink: SharedSink,
}

impl RetryConfig {
    /// Creates a new builder with defaults.
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    /// A private backoff instance for one request.
    pub(crate) fn fresh_backoff(&self) -> Box<dyn BackoffStrategy> {
        let mut backoff = self.backoff.clone();
        backoff.reset();
        backoff
    }
}

/// Builder for [`RetryConfig`].
///
/// Defaults:
/// - `max_retries`: 3 (so up to 4 physical attempts)
/// - backoff: exponential, 500 ms initial, 2× multiplier, 30 s cap, 0.5 jitter
/// - `max_elapsed_time`: none
/// - classifier: [`DefaultClassifier`]
pub struct RetryConfigBuilder {
    max_retries: usize,
    initial_interval: Duration,
    max_interval: Duration,
    multiplier: f64,
    jitter_factor: f64,
    max_elapsed_time: Option<Duration>,
    backoff: Option<Box<dyn BackoffStrategy>>,
    classifier: Option<Arc<dyn ResultClassifier>>,
    event_listeners: EventListeners<RetryEvent>,
    sink: SharedSink,
}

impl Default for RetryConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryConfigBuilder {
    pub fn new() -> Self {
        Self {
            max_retries: 3,
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.5,
            max_elapsed_time: None,
            backoff: None,
            classifier: None,
            event_listeners: EventListeners::new(),
            sink: noop_sink(),
        }
    }

    /// Maximum number of retries after the initial attempt.
    ///
    /// `0` disables retrying entirely; callers assembling a chain should
    /// skip installing the layer in that case.
    pub fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Initial backoff interval for the default exponential strategy.
    pub fn initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    /// Backoff cap for the default exponential strategy.
    pub fn max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    /// Growth multiplier for the default exponential strategy.
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Proportional jitter applied to every backoff interval.
    /// `0.0` is normalized to `0.5`.
    pub fn jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = factor;
        self
    }

    /// Wall-clock budget across all attempts. When the elapsed time plus
    /// the next planned sleep would exceed this, the engine abandons with
    /// the last result instead of sleeping.
    pub fn max_elapsed_time(mut self, budget: Duration) -> Self {
        self.max_elapsed_time = Some(budget);
        self
    }

    /// Injects a custom backoff strategy, overriding the exponential
    /// construction from the interval knobs above.
    pub fn backoff<B>(mut self, backoff: B) -> Self
    where
        B: BackoffStrategy + 'static,
    {
        self.backoff = Some(Box::new(backoff));
        self
    }

    /// Replaces the result classifier.
    pub fn classifier(mut self, classifier: Arc<dyn ResultClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Classifier shorthand: a closure producing a [`Verdict`].
    pub fn retry_on<F>(mut self, f: F) -> Self
    where
        F: Fn(&Result<HttpResponse, Error>) -> Verdict + Send + Sync + 'static,
    {
        self.classifier = Some(Arc::new(FnClassifier::new(f)));
        self
    }

    /// Metrics sink for `retry.attempts` / `retry.exhausted` /
    /// `retry.duration`.
    pub fn sink(mut self, sink: SharedSink) -> Self {
        self.sink = sink;
        self
    }

    /// Callback invoked before each retry with `(retry_number, delay)`.
    pub fn on_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RetryEvent::Retry { attempt, delay, .. } = event {
                f(*attempt, *delay);
            }
        }));
        self
    }

    /// Callback invoked on success with the total attempt count.
    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RetryEvent::Success { attempts, .. } = event {
                f(*attempts);
            }
        }));
        self
    }

    /// Callback invoked when retries are exhausted.
    pub fn on_exhausted<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RetryEvent::Exhausted { attempts, .. } = event {
                f(*attempts);
            }
        }));
        self
    }

    /// Registers a raw event listener.
    pub fn listener<L>(mut self, listener: L) -> Self
    where
        L: granite_core::EventListener<RetryEvent> + 'static,
    {
        self.event_listeners.add(listener);
        self
    }

    /// Builds the retry layer.
    pub fn build(self) -> RetryLayer {
        let backoff = self.backoff.unwrap_or_else(|| {
            Box::new(
                ExponentialBackoff::new(self.initial_interval)
                    .multiplier(self.multiplier)
                    .max_interval(self.max_interval)
                    .jitter_factor(self.jitter_factor),
            )
        });

        let config = RetryConfig {
            max_retries: self.max_retries,
            max_elapsed_time: self.max_elapsed_time,
            backoff,
            classifier: self
                .classifier
                .unwrap_or_else(|| Arc::new(DefaultClassifier::new())),
            event_listeners: self.event_listeners,
            sink: self.sink,
        };

        RetryLayer::new(config)
    }
}
