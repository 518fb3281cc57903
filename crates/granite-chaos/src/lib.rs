//! Chaos fault injection for the granite pipeline. Test environments only.
//!
//! The chaos layer sits innermost in the transport chain, immediately above
//! the base transport, so every physical attempt — retries and hedge
//! siblings alike — observes injected faults consistently.
//!
//! Per round trip, in order:
//! 1. With probability `timeout_rate`, park until the request's deadline
//!    (or the caller dropping) cancels the attempt.
//! 2. With probability `error_rate`, return
//!    [`granite_core::Error::ChaosInjected`].
//! 3. Apply the configured jittered latency, then forward.
//!
//! # Example
//!
//! ```rust,no_run
//! use granite_chaos::ChaosConfig;
//! use std::time::Duration;
//!
//! let layer = ChaosConfig::builder()
//!     .latency(Duration::from_millis(20))
//!     .latency_jitter(Duration::from_millis(10))
//!     .error_rate(0.05)
//!     .seed(42)
//!     .build();
//! # let _ = layer;
//! ```

mod config;
mod events;

pub use config::{ChaosConfig, ChaosConfigBuilder};
pub use events::ChaosEvent;

use futures::future::BoxFuture;
use granite_core::metrics::names;
use granite_core::{Error, HttpRequest, HttpResponse};
use rand::rngs::StdRng;
use rand::Rng;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tower::ServiceExt;
use tower_layer::Layer;
use tower_service::Service;

/// A Tower layer applying [`Chaos`] to an inner transport.
#[derive(Clone)]
pub struct ChaosLayer {
    config: Arc<ChaosConfig>,
    rng: Arc<Mutex<StdRng>>,
}

impl ChaosLayer {
    pub(crate) fn new(config: ChaosConfig) -> Self {
        let rng = config.create_rng();
        Self {
            config: Arc::new(config),
            rng: Arc::new(Mutex::new(rng)),
        }
    }

    pub fn builder() -> ChaosConfigBuilder {
        ChaosConfig::builder()
    }
}

impl<S> Layer<S> for ChaosLayer {
    type Service = Chaos<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Chaos {
            inner,
            config: Arc::clone(&self.config),
            rng: Arc::clone(&self.rng),
        }
    }
}

/// A Tower service that injects faults into round trips.
pub struct Chaos<S> {
    inner: S,
    config: Arc<ChaosConfig>,
    rng: Arc<Mutex<StdRng>>,
}

impl<S: Clone> Clone for Chaos<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            config: Arc::clone(&self.config),
            rng: Arc::clone(&self.rng),
        }
    }
}

impl<S> Service<HttpRequest> for Chaos<S>
where
    S: Service<HttpRequest, Response = HttpResponse, Error = Error> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = HttpResponse;
    type Error = Error;
    type Future = BoxFuture<'static, Result<HttpResponse, Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: HttpRequest) -> Self::Future {
        let clone = self.inner.clone();
        let service = std::mem::replace(&mut self.inner, clone);
        let config = Arc::clone(&self.config);
        let rng = Arc::clone(&self.rng);

        Box::pin(async move {
            let operation = request.operation.clone();

            // Decide everything up front so the lock is never held across
            // an await point.
            let (inject_timeout, inject_error, delay) = {
                let mut rng = rng.lock().unwrap();
                let inject_timeout =
                    config.timeout_rate > 0.0 && rng.random::<f64>() < config.timeout_rate;
                let inject_error = !inject_timeout
                    && config.error_rate > 0.0
                    && rng.random::<f64>() < config.error_rate;
                let delay = config.latency.map(|base| {
                    if config.latency_jitter.is_zero() {
                        base
                    } else {
                        base + Duration::from_secs_f64(
                            rng.random::<f64>() * config.latency_jitter.as_secs_f64(),
                        )
                    }
                });
                (inject_timeout, inject_error, delay)
            };

            if inject_timeout {
                tracing::warn!(operation = %operation, "chaos: simulating a hang");
                config.sink.counter(
                    names::CHAOS_INJECTED,
                    &[("operation", &operation), ("kind", "timeout")],
                    1,
                );
                config.event_listeners.emit(&ChaosEvent::TimeoutInjected {
                    operation,
                    timestamp: Instant::now(),
                });
                // Park until the deadline (or the caller) cancels us.
                futures::future::pending::<()>().await;
                unreachable!("pending future resolved");
            }

            if inject_error {
                tracing::warn!(operation = %operation, "chaos: injecting transport error");
                config.sink.counter(
                    names::CHAOS_INJECTED,
                    &[("operation", &operation), ("kind", "error")],
                    1,
                );
                config.event_listeners.emit(&ChaosEvent::ErrorInjected {
                    operation,
                    timestamp: Instant::now(),
                });
                return Err(Error::ChaosInjected);
            }

            if let Some(delay) = delay {
                config.event_listeners.emit(&ChaosEvent::LatencyInjected {
                    operation: operation.clone(),
                    delay,
                    timestamp: Instant::now(),
                });
                tokio::time::sleep(delay).await;
            } else {
                config.event_listeners.emit(&ChaosEvent::PassedThrough {
                    operation: operation.clone(),
                    timestamp: Instant::now(),
                });
            }

            service.oneshot(request).await
        })
    }
}
