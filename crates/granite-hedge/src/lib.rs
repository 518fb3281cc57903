//! Hedged execution for the granite pipeline.
//!
//! A hedged request fires its primary attempt immediately and schedules up
//! to `max_hedges` duplicates at `delay, 2·delay, …`. The first attempt to
//! produce a *usable* result — a success, or a permanent failure worth
//! handing to the caller — wins; sibling attempts are aborted and joined off
//! the caller's path so their responses are released without leaking.
//!
//! Each sibling is a full, independent traversal of the transport chain
//! (retry, breaker, chaos, base transport), cloned from the request's
//! buffered body. In adaptive mode the delay follows an observed latency
//! percentile per operation, fed by the [`LatencyTracker`].
//!
//! Hedging is safe only for idempotent operations; the executor duplicates
//! wire calls by design and does not check.

mod config;
mod events;
mod tracker;

pub use config::{AdaptiveHedge, HedgeConfig, HedgeConfigBuilder};
pub use events::HedgeEvent;
pub use tracker::{default_tracker, LatencyTracker};

use granite_core::metrics::names;
use granite_core::{Error, HttpRequest, HttpResponse, Verdict};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tower::ServiceExt;
use tower_service::Service;

type AttemptOutcome = (usize, Instant, Result<HttpResponse, Error>);

/// Spawned sibling attempts; aborted when the supervisor goes away.
struct Siblings {
    handles: Vec<JoinHandle<()>>,
}

impl Siblings {
    fn new(capacity: usize) -> Self {
        Self {
            handles: Vec::with_capacity(capacity),
        }
    }

    /// Aborts the remaining attempts and joins them off the caller's path;
    /// dropping their results releases the losing response bodies.
    fn finish(mut self) {
        let handles = std::mem::take(&mut self.handles);
        for handle in &handles {
            handle.abort();
        }
        tokio::spawn(async move {
            for handle in handles {
                let _ = handle.await;
            }
        });
    }
}

impl Drop for Siblings {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

/// Runs hedged round trips over a cloned transport chain.
pub struct HedgedExecutor {
    config: Arc<HedgeConfig>,
    tracker: Arc<LatencyTracker>,
}

impl HedgedExecutor {
    pub fn new(config: impl Into<Arc<HedgeConfig>>, tracker: Arc<LatencyTracker>) -> Self {
        Self {
            config: config.into(),
            tracker,
        }
    }

    pub fn tracker(&self) -> &Arc<LatencyTracker> {
        &self.tracker
    }

    /// The effective hedge delay for one operation: the configured fixed
    /// delay, or the adaptive percentile once enough samples exist.
    pub fn delay_for(&self, operation: &str) -> Duration {
        match &self.config.adaptive {
            Some(adaptive) => {
                if self.tracker.sample_count(operation) >= adaptive.min_samples {
                    self.tracker
                        .percentile(operation, adaptive.percentile)
                        .unwrap_or(adaptive.fallback_delay)
                } else {
                    adaptive.fallback_delay
                }
            }
            None => self.config.delay,
        }
    }

    /// Dispatches the request with hedging and returns the winning result.
    pub async fn execute<S>(
        &self,
        service: S,
        mut request: HttpRequest,
    ) -> Result<HttpResponse, Error>
    where
        S: Service<HttpRequest, Response = HttpResponse, Error = Error>
            + Clone
            + Send
            + 'static,
        S::Future: Send + 'static,
    {
        // Siblings replay the body; buffer a one-shot stream up front.
        request.body.materialize().await?;

        let config = &self.config;
        let operation = request.operation.clone();
        let delay = self.delay_for(&operation);
        let max_siblings = config.max_siblings();
        let started = tokio::time::Instant::now();

        let (tx, mut rx) = mpsc::channel::<AttemptOutcome>(max_siblings);
        let mut siblings = Siblings::new(max_siblings);

        siblings
            .handles
            .push(spawn_attempt(&service, &request, 0, tx.clone()));
        config.event_listeners.emit(&HedgeEvent::PrimaryStarted {
            operation: operation.clone(),
            timestamp: Instant::now(),
        });

        let mut launched = 1usize;
        let mut finished = 0usize;
        let mut primary_failure: Option<Result<HttpResponse, Error>> = None;
        let mut last_failure: Option<Result<HttpResponse, Error>> = None;

        loop {
            let outcome = if launched < max_siblings {
                let fire_at = started + delay * launched as u32;
                tokio::select! {
                    biased;

                    outcome = rx.recv() => outcome,

                    _ = tokio::time::sleep_until(fire_at) => {
                        let attempt = launched;
                        config.event_listeners.emit(&HedgeEvent::HedgeStarted {
                            operation: operation.clone(),
                            attempt,
                            delay: delay * attempt as u32,
                            timestamp: Instant::now(),
                        });
                        config.sink.counter(
                            names::HEDGE_LAUNCHED,
                            &[("operation", &operation)],
                            1,
                        );
                        tracing::debug!(
                            operation = %operation,
                            attempt,
                            "dispatching hedge attempt"
                        );
                        siblings
                            .handles
                            .push(spawn_attempt(&service, &request, attempt, tx.clone()));
                        launched += 1;
                        continue;
                    }
                }
            } else {
                rx.recv().await
            };

            let Some((attempt, attempt_started, result)) = outcome else {
                // Unreachable while we hold a sender; kept as a guard.
                break;
            };
            finished += 1;

            match config.classifier.classify(&result) {
                Verdict::Success | Verdict::Permanent => {
                    let latency = attempt_started.elapsed();
                    self.tracker.record(&operation, latency);
                    config.event_listeners.emit(&HedgeEvent::Winner {
                        operation: operation.clone(),
                        attempt,
                        latency,
                        cancelled: launched - finished,
                        timestamp: Instant::now(),
                    });
                    tracing::debug!(
                        operation = %operation,
                        attempt,
                        latency_ms = latency.as_millis() as u64,
                        "hedged request settled"
                    );
                    siblings.finish();
                    return result;
                }
                Verdict::Retryable => {
                    if attempt == 0 {
                        primary_failure = Some(result);
                    } else {
                        last_failure = Some(result);
                    }
                    if finished >= launched && launched >= max_siblings {
                        config.event_listeners.emit(&HedgeEvent::AllFailed {
                            operation: operation.clone(),
                            attempts: launched,
                            timestamp: Instant::now(),
                        });
                        break;
                    }
                }
            }
        }

        siblings.finish();
        // Prefer the primary's failure for stable caller-facing behavior.
        match primary_failure.or(last_failure) {
            Some(result) => result,
            None => Err(Error::Cancelled),
        }
    }
}

impl std::fmt::Debug for HedgedExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HedgedExecutor").finish_non_exhaustive()
    }
}

fn spawn_attempt<S>(
    service: &S,
    request: &HttpRequest,
    attempt: usize,
    tx: mpsc::Sender<AttemptOutcome>,
) -> JoinHandle<()>
where
    S: Service<HttpRequest, Response = HttpResponse, Error = Error> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    let service = service.clone();
    let request = request.clone();
    tokio::spawn(async move {
        let attempt_started = Instant::now();
        let result = service.oneshot(request).await;
        let _ = tx.send((attempt, attempt_started, result)).await;
    })
}
