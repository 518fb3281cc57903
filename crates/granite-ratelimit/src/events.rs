//! Events emitted by the rate-limit gate.

use granite_core::PolicyEvent;
use std::time::{Duration, Instant};

/// Events emitted while admitting requests through the gate.
///
/// `scope` is `"client"` for the client-wide bucket or the operation name
/// for a per-operation bucket.
#[derive(Debug, Clone)]
pub enum RateLimitEvent {
    /// A request passed the gate, possibly after waiting.
    Admitted {
        scope: String,
        waited: Duration,
        timestamp: Instant,
    },

    /// A request was rejected in fail-fast mode.
    Rejected { scope: String, timestamp: Instant },
}

impl PolicyEvent for RateLimitEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RateLimitEvent::Admitted { .. } => "admitted",
            RateLimitEvent::Rejected { .. } => "rejected",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RateLimitEvent::Admitted { timestamp, .. } => *timestamp,
            RateLimitEvent::Rejected { timestamp, .. } => *timestamp,
        }
    }

    fn pattern_name(&self) -> &str {
        match self {
            RateLimitEvent::Admitted { scope, .. } => scope,
            RateLimitEvent::Rejected { scope, .. } => scope,
        }
    }
}
