//! Client- and operation-scoped rate limiting for the granite pipeline.
//!
//! Two scopes share the same token-bucket mechanics:
//!
//! - A **client-level** bucket applied to every request dispatched through
//!   the client.
//! - **Per-operation** buckets, keyed by operation name in a registry, used
//!   when the request builder opts in with a per-request rate.
//!
//! The gate runs first in the execution pipeline so an over-limit request
//! fails before any allocation or policy work. Exhaustion behavior is
//! configurable: wait for a token (the sleep is cancelled with the request's
//! deadline) or fail fast with [`granite_core::Error::RateLimited`].
//!
//! # Example
//!
//! ```rust
//! use granite_ratelimit::RateLimitConfig;
//!
//! let gate = RateLimitConfig::builder()
//!     .rate(100.0)
//!     .burst(20)
//!     .fail_fast()
//!     .build();
//! # let _ = gate;
//! ```

mod events;
mod limiter;
mod registry;

pub use events::RateLimitEvent;
pub use limiter::RateLimiter;
pub use registry::{default_registry, OperationLimiters};

use granite_core::metrics::{names, noop_sink, SharedSink};
use granite_core::{Error, EventListeners, FnListener};
use std::sync::Arc;
use std::time::Instant;

/// What to do when the bucket is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Sleep until a token is available (bounded by the request deadline).
    #[default]
    Wait,
    /// Reject immediately with [`Error::RateLimited`].
    FailFast,
}

/// Configuration for the rate-limit gate.
pub struct RateLimitConfig {
    rate: Option<f64>,
    burst: u32,
    policy: OverflowPolicy,
    registry: Option<Arc<OperationLimiters>>,
    event_listeners: EventListeners<RateLimitEvent>,
    sink: SharedSink,
}

impl RateLimitConfig {
    pub fn builder() -> RateLimitConfigBuilder {
        RateLimitConfigBuilder::new()
    }
}

/// Builder for the gate. Defaults: no client-level bucket, burst 1,
/// wait-on-exhaustion, process-wide operation registry.
pub struct RateLimitConfigBuilder {
    config: RateLimitConfig,
}

impl Default for RateLimitConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimitConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: RateLimitConfig {
                rate: None,
                burst: 1,
                policy: OverflowPolicy::Wait,
                registry: None,
                event_listeners: EventListeners::new(),
                sink: noop_sink(),
            },
        }
    }

    /// Client-level tokens per second.
    pub fn rate(mut self, rate: f64) -> Self {
        self.config.rate = Some(rate);
        self
    }

    /// Client-level burst capacity. Zero is lifted to one.
    pub fn burst(mut self, burst: u32) -> Self {
        self.config.burst = burst;
        self
    }

    /// Reject over-limit requests instead of waiting.
    pub fn fail_fast(mut self) -> Self {
        self.config.policy = OverflowPolicy::FailFast;
        self
    }

    pub fn policy(mut self, policy: OverflowPolicy) -> Self {
        self.config.policy = policy;
        self
    }

    /// Replaces the process-wide per-operation registry with a private one.
    pub fn registry(mut self, registry: Arc<OperationLimiters>) -> Self {
        self.config.registry = Some(registry);
        self
    }

    /// Callback invoked when a request is rejected in fail-fast mode.
    pub fn on_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.config.event_listeners.add(FnListener::new(move |event| {
            if matches!(event, RateLimitEvent::Rejected { .. }) {
                f();
            }
        }));
        self
    }

    pub fn listener<L>(mut self, listener: L) -> Self
    where
        L: granite_core::EventListener<RateLimitEvent> + 'static,
    {
        self.config.event_listeners.add(listener);
        self
    }

    pub fn sink(mut self, sink: SharedSink) -> Self {
        self.config.sink = sink;
        self
    }

    pub fn build(self) -> RateLimitGate {
        let config = self.config;
        RateLimitGate {
            client: config.rate.map(|rate| Arc::new(RateLimiter::new(rate, config.burst))),
            policy: config.policy,
            registry: config.registry,
            event_listeners: config.event_listeners,
            sink: config.sink,
        }
    }
}

/// The admission gate run at the head of every request.
pub struct RateLimitGate {
    client: Option<Arc<RateLimiter>>,
    policy: OverflowPolicy,
    /// `None` means the process-wide default registry.
    registry: Option<Arc<OperationLimiters>>,
    event_listeners: EventListeners<RateLimitEvent>,
    sink: SharedSink,
}

impl RateLimitGate {
    /// A gate with no client-level bucket and default settings.
    pub fn disabled() -> Self {
        RateLimitConfig::builder().build()
    }

    fn operations(&self) -> &OperationLimiters {
        match &self.registry {
            Some(registry) => registry,
            None => default_registry(),
        }
    }

    /// Admits one request, applying the client bucket and, when the builder
    /// opted in, the per-operation bucket.
    pub async fn admit(
        &self,
        operation: &str,
        per_operation: Option<(f64, u32)>,
    ) -> Result<(), Error> {
        if let Some(limiter) = &self.client {
            self.pass(limiter, "client").await?;
        }
        if let Some((rate, burst)) = per_operation {
            let limiter = self.operations().get_or_create(operation, rate, burst);
            self.pass(&limiter, operation).await?;
        }
        Ok(())
    }

    async fn pass(&self, limiter: &RateLimiter, scope: &str) -> Result<(), Error> {
        match self.policy {
            OverflowPolicy::FailFast => {
                if !limiter.try_acquire() {
                    tracing::debug!(scope, "rate limit rejected request");
                    self.event_listeners.emit(&RateLimitEvent::Rejected {
                        scope: scope.to_string(),
                        timestamp: Instant::now(),
                    });
                    return Err(Error::RateLimited);
                }
                self.event_listeners.emit(&RateLimitEvent::Admitted {
                    scope: scope.to_string(),
                    waited: std::time::Duration::ZERO,
                    timestamp: Instant::now(),
                });
                Ok(())
            }
            OverflowPolicy::Wait => {
                let waited = limiter.acquire().await;
                if !waited.is_zero() {
                    self.sink.histogram(
                        names::RATE_LIMIT_WAIT,
                        &[("scope", scope)],
                        waited.as_secs_f64(),
                    );
                }
                self.event_listeners.emit(&RateLimitEvent::Admitted {
                    scope: scope.to_string(),
                    waited,
                    timestamp: Instant::now(),
                });
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for RateLimitGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitGate")
            .field("client", &self.client.as_ref().map(|l| (l.rate(), l.burst())))
            .field("policy", &self.policy)
            .finish()
    }
}
