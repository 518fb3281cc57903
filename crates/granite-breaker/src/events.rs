//! Events emitted by the circuit breaker.

use crate::circuit::CircuitState;
use granite_core::PolicyEvent;
use std::time::Instant;

/// Events emitted during circuit breaker operation.
#[derive(Debug, Clone)]
pub enum CircuitBreakerEvent {
    /// The breaker moved between states.
    StateTransition {
        operation: String,
        from: CircuitState,
        to: CircuitState,
        timestamp: Instant,
    },

    /// A call was rejected without touching the wire.
    CallRejected {
        operation: String,
        state: CircuitState,
        timestamp: Instant,
    },

    /// A call outcome was recorded as a success.
    SuccessRecorded {
        operation: String,
        state: CircuitState,
        timestamp: Instant,
    },

    /// A call outcome was recorded as a failure.
    FailureRecorded {
        operation: String,
        state: CircuitState,
        timestamp: Instant,
    },

    /// The shared store failed; the breaker fell back to local counters.
    StoreDegraded {
        operation: String,
        reason: String,
        timestamp: Instant,
    },
}

impl PolicyEvent for CircuitBreakerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CircuitBreakerEvent::StateTransition { .. } => "state_transition",
            CircuitBreakerEvent::CallRejected { .. } => "call_rejected",
            CircuitBreakerEvent::SuccessRecorded { .. } => "success_recorded",
            CircuitBreakerEvent::FailureRecorded { .. } => "failure_recorded",
            CircuitBreakerEvent::StoreDegraded { .. } => "store_degraded",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            CircuitBreakerEvent::StateTransition { timestamp, .. } => *timestamp,
            CircuitBreakerEvent::CallRejected { timestamp, .. } => *timestamp,
            CircuitBreakerEvent::SuccessRecorded { timestamp, .. } => *timestamp,
            CircuitBreakerEvent::FailureRecorded { timestamp, .. } => *timestamp,
            CircuitBreakerEvent::StoreDegraded { timestamp, .. } => *timestamp,
        }
    }

    fn pattern_name(&self) -> &str {
        match self {
            CircuitBreakerEvent::StateTransition { operation, .. } => operation,
            CircuitBreakerEvent::CallRejected { operation, .. } => operation,
            CircuitBreakerEvent::SuccessRecorded { operation, .. } => operation,
            CircuitBreakerEvent::FailureRecorded { operation, .. } => operation,
            CircuitBreakerEvent::StoreDegraded { operation, .. } => operation,
        }
    }
}
