//! Circuit breaker middleware for the granite HTTP pipeline.
//!
//! One three-state breaker exists per operation name. While closed, call
//! outcomes accumulate into a counter window; the trip rule (consecutive
//! failures, or failure ratio over a minimum request count) moves the
//! breaker to open. Open circuits reject immediately with
//! [`granite_core::Error::CircuitOpen`] and never touch the wire. After the
//! open timeout, a bounded number of probes decides between closing and
//! reopening.
//!
//! The breaker consults a [`granite_core::FailureClassifier`] on the full
//! round-trip result, so a 500 response with no transport error still counts
//! as a failure while 429 (backpressure, not ill health) does not.
//!
//! Counters can be shared across clients through a [`SharedStore`] for
//! fleet-wide tripping; a failing store degrades the breaker to local
//! counting rather than failing requests.
//!
//! # Example
//!
//! ```rust,no_run
//! use granite_breaker::BreakerConfig;
//! use std::time::Duration;
//!
//! let layer = BreakerConfig::builder()
//!     .failure_threshold(5)
//!     .open_timeout(Duration::from_secs(10))
//!     .on_state_change(|from, to| {
//!         eprintln!("breaker: {} -> {}", from.name(), to.name());
//!     })
//!     .build();
//! # let _ = layer;
//! ```

mod circuit;
mod config;
mod events;
mod layer;
mod registry;
mod store;

pub use circuit::{CircuitBreaker, CircuitState, Counts, Permit};
pub use config::{BreakerConfig, BreakerConfigBuilder, StateChangeHook, TripRule};
pub use events::CircuitBreakerEvent;
pub use layer::BreakerLayer;
pub use registry::BreakerRegistry;
pub use store::{BreakerSnapshot, InMemorySharedStore, SharedStore, StoreError};

use futures::future::BoxFuture;
use granite_core::{Error, HttpRequest, HttpResponse};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::ServiceExt;
use tower_service::Service;

/// A Tower service that applies circuit breaking to an inner transport.
pub struct Breaker<S> {
    inner: S,
    registry: Arc<BreakerRegistry>,
}

impl<S> Breaker<S> {
    pub(crate) fn new(inner: S, registry: Arc<BreakerRegistry>) -> Self {
        Self { inner, registry }
    }
}

impl<S: Clone> Clone for Breaker<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<S> Service<HttpRequest> for Breaker<S>
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
        let mut service = std::mem::replace(&mut self.inner, clone);
        let registry = Arc::clone(&self.registry);

        Box::pin(async move {
            let breaker = registry.get_or_create(&request.operation);
            let permit = breaker.try_acquire()?;

            let result = match service.ready().await {
                Ok(ready) => ready.call(request).await,
                Err(err) => Err(err),
            };

            let failure = registry.config().classifier.is_failure(&result);
            permit.record(failure).await;

            result
        })
    }
}
