//! Events emitted by the hedged executor.

use granite_core::PolicyEvent;
use std::time::{Duration, Instant};

/// Events emitted during hedged execution. Attempt 0 is the primary;
/// hedges are numbered from 1.
#[derive(Debug, Clone)]
pub enum HedgeEvent {
    /// The primary attempt was dispatched.
    PrimaryStarted {
        operation: String,
        timestamp: Instant,
    },

    /// A hedge attempt was dispatched after its staggered delay.
    HedgeStarted {
        operation: String,
        attempt: usize,
        delay: Duration,
        timestamp: Instant,
    },

    /// An attempt produced the accepted result.
    Winner {
        operation: String,
        attempt: usize,
        latency: Duration,
        /// Sibling attempts cancelled when the winner was accepted.
        cancelled: usize,
        timestamp: Instant,
    },

    /// No attempt produced a usable result.
    AllFailed {
        operation: String,
        attempts: usize,
        timestamp: Instant,
    },
}

impl PolicyEvent for HedgeEvent {
    fn event_type(&self) -> &'static str {
        match self {
            HedgeEvent::PrimaryStarted { .. } => "primary_started",
            HedgeEvent::HedgeStarted { .. } => "hedge_started",
            HedgeEvent::Winner { .. } => "winner",
            HedgeEvent::AllFailed { .. } => "all_failed",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            HedgeEvent::PrimaryStarted { timestamp, .. } => *timestamp,
            HedgeEvent::HedgeStarted { timestamp, .. } => *timestamp,
            HedgeEvent::Winner { timestamp, .. } => *timestamp,
            HedgeEvent::AllFailed { timestamp, .. } => *timestamp,
        }
    }

    fn pattern_name(&self) -> &str {
        match self {
            HedgeEvent::PrimaryStarted { operation, .. } => operation,
            HedgeEvent::HedgeStarted { operation, .. } => operation,
            HedgeEvent::Winner { operation, .. } => operation,
            HedgeEvent::AllFailed { operation, .. } => operation,
        }
    }
}
