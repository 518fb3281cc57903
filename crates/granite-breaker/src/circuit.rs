//! The circuit state machine.
//!
//! One [`CircuitBreaker`] exists per operation name per client. The machine
//! has three states:
//!
//! - **Closed**: calls flow; outcomes accumulate into [`Counts`]. The
//!   counter window is cleared every `interval` so old failures cannot
//!   perpetually doom a recovered service.
//! - **Open**: calls are rejected without touching the wire. After
//!   `open_timeout` the breaker moves to half-open.
//! - **HalfOpen**: up to `probe_requests` concurrent probes are admitted.
//!   `probe_requests` consecutive successes close the circuit; any failure
//!   reopens it.

use crate::config::BreakerConfig;
use crate::events::CircuitBreakerEvent;
use crate::store::BreakerSnapshot;
use granite_core::metrics::names;
use granite_core::Error;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// The state of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CircuitState {
    Closed = 0,
    Open = 1,
    HalfOpen = 2,
}

impl CircuitState {
    pub(crate) fn as_gauge(self) -> f64 {
        self as u8 as f64
    }

    pub fn name(self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Counter window accumulated per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub consecutive_failures: u64,
    pub consecutive_successes: u64,
}

impl Counts {
    pub(crate) fn record_success(&mut self) {
        self.requests += 1;
        self.successes += 1;
        self.consecutive_successes += 1;
        self.consecutive_failures = 0;
    }

    pub(crate) fn record_failure(&mut self) {
        self.requests += 1;
        self.failures += 1;
        self.consecutive_failures += 1;
        self.consecutive_successes = 0;
    }

    pub(crate) fn clear(&mut self) {
        *self = Counts::default();
    }

    /// Failures over requests; zero when the window is empty.
    pub fn failure_ratio(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.failures as f64 / self.requests as f64
        }
    }
}

#[derive(Debug)]
struct Circuit {
    state: CircuitState,
    counts: Counts,
    window_started: Instant,
    opened_at: Instant,
    half_open_inflight: u64,
}

impl Circuit {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            state: CircuitState::Closed,
            counts: Counts::default(),
            window_started: now,
            opened_at: now,
            half_open_inflight: 0,
        }
    }
}

/// A single operation's breaker: admission control plus outcome recording.
pub struct CircuitBreaker {
    operation: String,
    config: Arc<BreakerConfig>,
    circuit: Mutex<Circuit>,
    /// Cleared after the first shared-store failure so a broken store
    /// degrades the breaker to purely local counting instead of adding
    /// latency and log noise to every call.
    store_healthy: AtomicBool,
}

/// Admission token handed out by [`CircuitBreaker::try_acquire`].
///
/// Must be settled through [`Permit::record`]; a dropped, unsettled permit
/// releases its half-open probe slot without recording an outcome (the
/// attempt was abandoned by the caller).
pub struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    armed: bool,
}

impl CircuitBreaker {
    pub(crate) fn new(operation: String, config: Arc<BreakerConfig>) -> Self {
        Self {
            operation,
            config,
            circuit: Mutex::new(Circuit::new()),
            store_healthy: AtomicBool::new(true),
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Current state, advancing time-based transitions first.
    pub fn state(&self) -> CircuitState {
        let mut circuit = self.circuit.lock();
        self.advance(&mut circuit);
        circuit.state
    }

    /// Snapshot of the current counter window.
    pub fn counts(&self) -> Counts {
        self.circuit.lock().counts
    }

    /// Requests admission for one call.
    ///
    /// Open circuits reject with [`Error::CircuitOpen`] without touching the
    /// wire. Half-open circuits admit at most `probe_requests` concurrent
    /// probes.
    pub fn try_acquire(&self) -> Result<Permit<'_>, Error> {
        let mut circuit = self.circuit.lock();
        self.advance(&mut circuit);

        match circuit.state {
            CircuitState::Closed => Ok(Permit {
                breaker: self,
                probe: false,
                armed: true,
            }),
            CircuitState::HalfOpen => {
                if circuit.half_open_inflight < self.config.probe_requests {
                    circuit.half_open_inflight += 1;
                    Ok(Permit {
                        breaker: self,
                        probe: true,
                        armed: true,
                    })
                } else {
                    self.reject(&circuit);
                    Err(Error::CircuitOpen {
                        operation: self.operation.clone(),
                    })
                }
            }
            CircuitState::Open => {
                self.reject(&circuit);
                Err(Error::CircuitOpen {
                    operation: self.operation.clone(),
                })
            }
        }
    }

    fn reject(&self, circuit: &Circuit) {
        self.config
            .event_listeners
            .emit(&CircuitBreakerEvent::CallRejected {
                operation: self.operation.clone(),
                state: circuit.state,
                timestamp: Instant::now(),
            });
    }

    /// Time-based transitions: Open → HalfOpen after the open timeout, and
    /// the periodic Closed-window clear.
    fn advance(&self, circuit: &mut Circuit) {
        match circuit.state {
            CircuitState::Open => {
                if circuit.opened_at.elapsed() >= self.config.open_timeout {
                    self.transition(circuit, CircuitState::HalfOpen);
                }
            }
            CircuitState::Closed => {
                if !self.config.interval.is_zero()
                    && circuit.window_started.elapsed() >= self.config.interval
                {
                    circuit.counts.clear();
                    circuit.window_started = Instant::now();
                }
            }
            CircuitState::HalfOpen => {}
        }
    }

    fn transition(&self, circuit: &mut Circuit, to: CircuitState) {
        let from = circuit.state;
        if from == to {
            return;
        }
        circuit.state = to;
        match to {
            CircuitState::Open => {
                circuit.opened_at = Instant::now();
            }
            CircuitState::HalfOpen => {
                circuit.counts.clear();
                circuit.half_open_inflight = 0;
            }
            CircuitState::Closed => {
                circuit.counts.clear();
                circuit.window_started = Instant::now();
            }
        }

        tracing::info!(
            operation = %self.operation,
            from = from.name(),
            to = to.name(),
            "circuit breaker state transition"
        );
        self.config.sink.gauge(
            names::CIRCUIT_BREAKER_STATE,
            &[("operation", &self.operation)],
            to.as_gauge(),
        );
        self.config
            .event_listeners
            .emit(&CircuitBreakerEvent::StateTransition {
                operation: self.operation.clone(),
                from,
                to,
                timestamp: Instant::now(),
            });
        if let Some(callback) = &self.config.on_state_change {
            callback(from, to);
        }
    }

    /// Applies one settled outcome. `probe` marks a half-open admission.
    async fn apply(&self, probe: bool, failure: bool) {
        // Shared counters: read-modify-write outside the lock, adopt the
        // merged window for the local trip decision.
        let merged = self.load_shared().await;

        let to_save = {
            let mut circuit = self.circuit.lock();
            self.advance(&mut circuit);

            if probe {
                circuit.half_open_inflight = circuit.half_open_inflight.saturating_sub(1);
            }

            let event = if failure {
                CircuitBreakerEvent::FailureRecorded {
                    operation: self.operation.clone(),
                    state: circuit.state,
                    timestamp: Instant::now(),
                }
            } else {
                CircuitBreakerEvent::SuccessRecorded {
                    operation: self.operation.clone(),
                    state: circuit.state,
                    timestamp: Instant::now(),
                }
            };
            self.config.event_listeners.emit(&event);

            match circuit.state {
                CircuitState::HalfOpen => {
                    if failure {
                        self.transition(&mut circuit, CircuitState::Open);
                    } else {
                        circuit.counts.record_success();
                        if circuit.counts.consecutive_successes >= self.config.probe_requests {
                            self.transition(&mut circuit, CircuitState::Closed);
                        }
                    }
                    None
                }
                CircuitState::Closed => {
                    let mut snapshot = merged;
                    if let Some(snapshot) = snapshot.as_mut() {
                        // Fleet-wide window replaces the local one.
                        circuit.counts = snapshot.counts;
                    }
                    if failure {
                        circuit.counts.record_failure();
                    } else {
                        circuit.counts.record_success();
                    }
                    if let Some(snapshot) = snapshot.as_mut() {
                        snapshot.counts = circuit.counts;
                        snapshot.version += 1;
                    }
                    if failure && (self.config.ready_to_trip)(&circuit.counts) {
                        self.transition(&mut circuit, CircuitState::Open);
                    }
                    snapshot
                }
                // A result from an attempt admitted before the trip; the
                // window it belonged to is gone.
                CircuitState::Open => None,
            }
        };

        if let Some(snapshot) = to_save {
            self.save_shared(snapshot).await;
        }
    }

    fn release_probe(&self) {
        let mut circuit = self.circuit.lock();
        circuit.half_open_inflight = circuit.half_open_inflight.saturating_sub(1);
    }

    async fn load_shared(&self) -> Option<BreakerSnapshot> {
        let store = self.config.store.as_ref()?;
        if !self.store_healthy.load(Ordering::Relaxed) {
            return None;
        }
        match store.load(&self.operation).await {
            Ok(Some(snapshot)) => Some(snapshot),
            Ok(None) => Some(BreakerSnapshot::default()),
            Err(err) => {
                self.degrade_store(&err.to_string());
                None
            }
        }
    }

    async fn save_shared(&self, snapshot: BreakerSnapshot) {
        let Some(store) = self.config.store.as_ref() else {
            return;
        };
        if !self.store_healthy.load(Ordering::Relaxed) {
            return;
        }
        if let Err(err) = store.save(&self.operation, snapshot).await {
            self.degrade_store(&err.to_string());
        }
    }

    fn degrade_store(&self, reason: &str) {
        if self.store_healthy.swap(false, Ordering::Relaxed) {
            tracing::warn!(
                operation = %self.operation,
                reason = %reason,
                "shared breaker store failed; continuing with local counters"
            );
            self.config
                .event_listeners
                .emit(&CircuitBreakerEvent::StoreDegraded {
                    operation: self.operation.clone(),
                    reason: reason.to_string(),
                    timestamp: Instant::now(),
                });
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("operation", &self.operation)
            .finish_non_exhaustive()
    }
}

impl Permit<'_> {
    /// Settles the admitted call with its classified outcome.
    pub async fn record(mut self, failure: bool) {
        self.armed = false;
        let probe = self.probe;
        self.breaker.apply(probe, failure).await;
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if self.armed && self.probe {
            self.breaker.release_probe();
        }
    }
}
