//! Events emitted by the chaos layer.

use granite_core::PolicyEvent;
use std::time::{Duration, Instant};

/// Events emitted per round trip through the chaos layer.
#[derive(Debug, Clone)]
pub enum ChaosEvent {
    /// A simulated transport error was returned.
    ErrorInjected {
        operation: String,
        timestamp: Instant,
    },

    /// The request was parked until its deadline cancels it.
    TimeoutInjected {
        operation: String,
        timestamp: Instant,
    },

    /// Extra latency was added before forwarding.
    LatencyInjected {
        operation: String,
        delay: Duration,
        timestamp: Instant,
    },

    /// The request passed through untouched.
    PassedThrough {
        operation: String,
        timestamp: Instant,
    },
}

impl PolicyEvent for ChaosEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ChaosEvent::ErrorInjected { .. } => "error_injected",
            ChaosEvent::TimeoutInjected { .. } => "timeout_injected",
            ChaosEvent::LatencyInjected { .. } => "latency_injected",
            ChaosEvent::PassedThrough { .. } => "passed_through",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            ChaosEvent::ErrorInjected { timestamp, .. } => *timestamp,
            ChaosEvent::TimeoutInjected { timestamp, .. } => *timestamp,
            ChaosEvent::LatencyInjected { timestamp, .. } => *timestamp,
            ChaosEvent::PassedThrough { timestamp, .. } => *timestamp,
        }
    }

    fn pattern_name(&self) -> &str {
        match self {
            ChaosEvent::ErrorInjected { operation, .. } => operation,
            ChaosEvent::TimeoutInjected { operation, .. } => operation,
            ChaosEvent::LatencyInjected { operation, .. } => operation,
            ChaosEvent::PassedThrough { operation, .. } => operation,
        }
    }
}
