//! Configuration for the chaos layer.

use crate::events::ChaosEvent;
use crate::ChaosLayer;
use granite_core::metrics::{noop_sink, SharedSink};
use granite_core::{EventListeners, FnListener};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Duration;

/// Configuration for chaos injection. Test environments only.
pub struct ChaosConfig {
    pub(crate) latency: Option<Duration>,
    pub(crate) latency_jitter: Duration,
    pub(crate) error_rate: f64,
    pub(crate) timeout_rate: f64,
    pub(crate) seed: Option<u64>,
    pub(crate) event_listeners: EventListeners<ChaosEvent>,
    pub(crate) sink: SharedSink,
}

impl ChaosConfig {
    pub fn builder() -> ChaosConfigBuilder {
        ChaosConfigBuilder::new()
    }

    pub(crate) fn create_rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }
}

/// Builder for [`ChaosConfig`].
///
/// Defaults: no latency, no errors, no timeouts — a fully transparent
/// layer until a knob is turned.
pub struct ChaosConfigBuilder {
    config: ChaosConfig,
}

impl Default for ChaosConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChaosConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ChaosConfig {
                latency: None,
                latency_jitter: Duration::ZERO,
                error_rate: 0.0,
                timeout_rate: 0.0,
                seed: None,
                event_listeners: EventListeners::new(),
                sink: noop_sink(),
            },
        }
    }

    /// Fixed latency added to every forwarded request.
    pub fn latency(mut self, latency: Duration) -> Self {
        self.config.latency = Some(latency);
        self
    }

    /// Random extra latency in `0..=jitter` added on top of the fixed
    /// latency.
    pub fn latency_jitter(mut self, jitter: Duration) -> Self {
        self.config.latency_jitter = jitter;
        self
    }

    /// Probability (`0.0..=1.0`) of returning a simulated transport error.
    pub fn error_rate(mut self, rate: f64) -> Self {
        self.config.error_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Probability (`0.0..=1.0`) of parking the request until its deadline
    /// cancels it.
    pub fn timeout_rate(mut self, rate: f64) -> Self {
        self.config.timeout_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Seeds the RNG for deterministic chaos in tests.
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    /// Callback invoked whenever a fault (error or timeout) is injected.
    pub fn on_fault<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.config.event_listeners.add(FnListener::new(move |event| {
            if matches!(
                event,
                ChaosEvent::ErrorInjected { .. } | ChaosEvent::TimeoutInjected { .. }
            ) {
                f();
            }
        }));
        self
    }

    pub fn listener<L>(mut self, listener: L) -> Self
    where
        L: granite_core::EventListener<ChaosEvent> + 'static,
    {
        self.config.event_listeners.add(listener);
        self
    }

    pub fn sink(mut self, sink: SharedSink) -> Self {
        self.config.sink = sink;
        self
    }

    pub fn build(self) -> ChaosLayer {
        ChaosLayer::new(self.config)
    }
}
