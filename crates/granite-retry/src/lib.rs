//! Retry middleware for the granite HTTP pipeline.
//!
//! The retry engine re-dispatches a request while the configured classifier
//! rules each failure transient, sleeping between attempts according to a
//! pluggable [`BackoffStrategy`]. Request bodies are materialised at most
//! once: every attempt gets a fresh reader over the same bytes, so each
//! physical attempt delivers exactly the same payload.
//!
//! # Example
//!
//! ```rust,no_run
//! use granite_retry::RetryConfig;
//! use std::time::Duration;
//!
//! let layer = RetryConfig::builder()
//!     .max_retries(3)
//!     .initial_interval(Duration::from_millis(200))
//!     .max_elapsed_time(Duration::from_secs(15))
//!     .on_retry(|attempt, delay| {
//!         eprintln!("retry {attempt} after {delay:?}");
//!     })
//!     .build();
//! # let _ = layer;
//! ```
//!
//! Cancellation composes by drop: when the caller's deadline fires, the
//! in-flight attempt and any pending backoff sleep are dropped with the
//! future, so no further attempt is issued.

mod backoff;
mod config;
mod events;
mod layer;

pub use backoff::{
    BackoffStrategy, ConstantBackoff, DecorrelatedJitter, ExponentialBackoff, LinearBackoff,
    Tier, TieredBackoff,
};
pub use config::{RetryConfig, RetryConfigBuilder};
pub use events::RetryEvent;
pub use layer::RetryLayer;

use futures::future::BoxFuture;
use granite_core::metrics::names;
use granite_core::{Error, HttpRequest, HttpResponse, Verdict};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tower::ServiceExt;
use tower_service::Service;

/// A Tower service that retries failed round trips.
pub struct Retry<S> {
    inner: S,
    config: Arc<RetryConfig>,
}

impl<S> Retry<S> {
    pub(crate) fn new(inner: S, config: Arc<RetryConfig>) -> Self {
        Self { inner, config }
    }
}

impl<S: Clone> Clone for Retry<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S> Service<HttpRequest> for Retry<S>
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
        // Take the service that was driven to readiness, leave the clone.
        let service = std::mem::replace(&mut self.inner, clone);
        let config = Arc::clone(&self.config);

        Box::pin(async move { execute_with_retry(service, request, config).await })
    }
}

async fn execute_with_retry<S>(
    mut service: S,
    mut request: HttpRequest,
    config: Arc<RetryConfig>,
) -> Result<HttpResponse, Error>
where
    S: Service<HttpRequest, Response = HttpResponse, Error = Error> + Send,
    S::Future: Send,
{
    // Every attempt must start from a fresh reader over the same bytes, so
    // a one-shot stream is buffered up front.
    request.body.materialize().await?;

    let operation = request.operation.clone();
    let started = Instant::now();
    let mut backoff = config.fresh_backoff();
    let max_attempts = config.max_retries + 1;
    let mut attempt = 1usize;

    loop {
        let result = match service.ready().await {
            Ok(ready) => ready.call(request.clone()).await,
            Err(err) => Err(err),
        };

        match config.classifier.classify(&result) {
            Verdict::Success => {
                config.event_listeners.emit(&RetryEvent::Success {
                    operation: operation.clone(),
                    attempts: attempt,
                    timestamp: Instant::now(),
                });
                record_duration(&config, &operation, started);
                return result;
            }
            Verdict::Permanent => {
                config.event_listeners.emit(&RetryEvent::IgnoredError {
                    operation: operation.clone(),
                    timestamp: Instant::now(),
                });
                record_duration(&config, &operation, started);
                // A permanent failure with a response (e.g. a 500) keeps its
                // body intact for caller inspection.
                return result;
            }
            Verdict::Retryable => {
                if attempt >= max_attempts {
                    give_up(&config, &operation, attempt, false, started);
                    return result;
                }

                let delay = backoff.next();
                if let Some(budget) = config.max_elapsed_time {
                    if started.elapsed() + delay > budget {
                        give_up(&config, &operation, attempt, true, started);
                        return result;
                    }
                }

                let reason = retry_reason(&result);
                // Release the connection before sleeping.
                drop(result);

                config.event_listeners.emit(&RetryEvent::Retry {
                    operation: operation.clone(),
                    attempt,
                    delay,
                    reason: reason.clone(),
                    timestamp: Instant::now(),
                });
                config.sink.counter(
                    names::RETRY_ATTEMPTS,
                    &[("operation", &operation), ("reason", &reason)],
                    1,
                );
                tracing::debug!(
                    operation = %operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    reason = %reason,
                    "scheduling retry"
                );

                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

fn give_up(config: &RetryConfig, operation: &str, attempts: usize, budget: bool, started: Instant) {
    config.event_listeners.emit(&RetryEvent::Exhausted {
        operation: operation.to_string(),
        attempts,
        budget_exceeded: budget,
        timestamp: Instant::now(),
    });
    config
        .sink
        .counter(names::RETRY_EXHAUSTED, &[("operation", operation)], 1);
    tracing::warn!(
        operation = %operation,
        attempts,
        budget_exceeded = budget,
        "retries exhausted"
    );
    record_duration(config, operation, started);
}

fn record_duration(config: &RetryConfig, operation: &str, started: Instant) {
    config.sink.histogram(
        names::RETRY_DURATION,
        &[("operation", operation)],
        started.elapsed().as_secs_f64(),
    );
}

fn retry_reason(result: &Result<HttpResponse, Error>) -> String {
    match result {
        Ok(response) => format!("status {}", response.status.as_u16()),
        Err(Error::Timeout { .. }) => "timeout".to_string(),
        Err(Error::ChaosInjected) => "chaos".to_string(),
        Err(Error::Transport { .. }) => "transport".to_string(),
        Err(other) => other.to_string(),
    }
}
