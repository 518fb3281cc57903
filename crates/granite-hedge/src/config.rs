//! Configuration for hedged execution.

use crate::events::HedgeEvent;
use granite_core::metrics::{noop_sink, SharedSink};
use granite_core::{DefaultClassifier, EventListeners, FnListener, ResultClassifier};
use std::sync::Arc;
use std::time::Duration;

/// Adaptive delay parameters: the hedge delay tracks an observed latency
/// percentile instead of a fixed value.
#[derive(Debug, Clone, Copy)]
pub struct AdaptiveHedge {
    /// Percentile of the operation's latency window to use as the delay.
    pub percentile: f64,
    /// Samples required before the percentile is trusted.
    pub min_samples: usize,
    /// Delay used until the tracker has enough samples.
    pub fallback_delay: Duration,
}

impl Default for AdaptiveHedge {
    fn default() -> Self {
        Self {
            percentile: 0.95,
            min_samples: 10,
            fallback_delay: Duration::from_millis(100),
        }
    }
}

/// Configuration for the hedged executor.
///
/// Hedging is an idempotency contract: duplicate attempts reach the server,
/// so only hedge operations that are safe to repeat. The executor does not
/// enforce this; the responsibility is the caller's.
pub struct HedgeConfig {
    pub(crate) delay: Duration,
    pub(crate) max_hedges: usize,
    pub(crate) adaptive: Option<AdaptiveHedge>,
    /// Absolute ceiling on dispatched siblings (primary included), bounding
    /// the `(hedges + 1) × (retries + 1)` wire-call multiplication when
    /// hedging composes with retry.
    pub(crate) max_total_attempts: Option<usize>,
    pub(crate) classifier: Arc<dyn ResultClassifier>,
    pub(crate) event_listeners: EventListeners<HedgeEvent>,
    pub(crate) sink: SharedSink,
}

impl HedgeConfig {
    pub fn builder() -> HedgeConfigBuilder {
        HedgeConfigBuilder::new()
    }

    /// Fixed-delay hedging with defaults for everything else.
    pub fn fixed(delay: Duration) -> HedgeConfig {
        HedgeConfigBuilder::new().delay(delay).into_config()
    }

    pub(crate) fn max_siblings(&self) -> usize {
        let siblings = self.max_hedges + 1;
        match self.max_total_attempts {
            Some(ceiling) => siblings.min(ceiling).max(1),
            None => siblings,
        }
    }
}

/// Builder for [`HedgeConfig`].
///
/// Defaults: 100 ms fixed delay, 1 hedge, no attempt ceiling,
/// [`DefaultClassifier`] for winner selection.
pub struct HedgeConfigBuilder {
    config: HedgeConfig,
}

impl Default for HedgeConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HedgeConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: HedgeConfig {
                delay: Duration::from_millis(100),
                max_hedges: 1,
                adaptive: None,
                max_total_attempts: None,
                classifier: Arc::new(DefaultClassifier::new()),
                event_listeners: EventListeners::new(),
                sink: noop_sink(),
            },
        }
    }

    /// Fixed delay before the first hedge; hedge `n` fires at `n × delay`.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.config.delay = delay;
        self
    }

    /// Maximum number of hedges on top of the primary.
    pub fn max_hedges(mut self, hedges: usize) -> Self {
        self.config.max_hedges = hedges;
        self
    }

    /// Derives the delay from the operation's observed latency percentile.
    pub fn adaptive(mut self, adaptive: AdaptiveHedge) -> Self {
        self.config.adaptive = Some(adaptive);
        self
    }

    /// Hard ceiling on dispatched siblings, primary included.
    pub fn max_total_attempts(mut self, ceiling: usize) -> Self {
        self.config.max_total_attempts = Some(ceiling.max(1));
        self
    }

    /// Replaces the winner-selection classifier.
    pub fn classifier(mut self, classifier: Arc<dyn ResultClassifier>) -> Self {
        self.config.classifier = classifier;
        self
    }

    /// Callback invoked when a hedge attempt is dispatched.
    pub fn on_hedge<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.config.event_listeners.add(FnListener::new(move |event| {
            if let HedgeEvent::HedgeStarted { attempt, .. } = event {
                f(*attempt);
            }
        }));
        self
    }

    pub fn listener<L>(mut self, listener: L) -> Self
    where
        L: granite_core::EventListener<HedgeEvent> + 'static,
    {
        self.config.event_listeners.add(listener);
        self
    }

    pub fn sink(mut self, sink: SharedSink) -> Self {
        self.config.sink = sink;
        self
    }

    pub(crate) fn into_config(self) -> HedgeConfig {
        self.config
    }

    pub fn build(self) -> HedgeConfig {
        self.config
    }
}
