//! Events emitted by the retry engine.

use granite_core::PolicyEvent;
use std::time::{Duration, Instant};

/// Events emitted during retry execution.
///
/// `operation` is the request's operation name; attempts are 1-based
/// physical attempts, so the first retry reports `attempt = 1`.
#[derive(Debug, Clone)]
pub enum RetryEvent {
    /// A retry is about to be scheduled after a failed attempt.
    Retry {
        operation: String,
        /// The retry number (1-indexed).
        attempt: usize,
        /// Backoff delay before the retry fires.
        delay: Duration,
        /// Why the previous attempt was retryable, e.g. `"status 503"`.
        reason: String,
        timestamp: Instant,
    },

    /// The call produced a usable result.
    Success {
        operation: String,
        /// Total physical attempts, including the first.
        attempts: usize,
        timestamp: Instant,
    },

    /// Every allowed attempt was used up, or the wall-clock budget ran out.
    Exhausted {
        operation: String,
        attempts: usize,
        /// True when abandoned due to `max_elapsed_time` rather than the
        /// attempt ceiling.
        budget_exceeded: bool,
        timestamp: Instant,
    },

    /// The classifier ruled the failure permanent; no retry was attempted.
    IgnoredError {
        operation: String,
        timestamp: Instant,
    },
}

impl PolicyEvent for RetryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RetryEvent::Retry { .. } => "retry",
            RetryEvent::Success { .. } => "success",
            RetryEvent::Exhausted { .. } => "exhausted",
            RetryEvent::IgnoredError { .. } => "ignored_error",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RetryEvent::Retry { timestamp, .. } => *timestamp,
            RetryEvent::Success { timestamp, .. } => *timestamp,
            RetryEvent::Exhausted { timestamp, .. } => *timestamp,
            RetryEvent::IgnoredError { timestamp, .. } => *timestamp,
        }
    }

    fn pattern_name(&self) -> &str {
        match self {
            RetryEvent::Retry { operation, .. } => operation,
            RetryEvent::Success { operation, .. } => operation,
            RetryEvent::Exhausted { operation, .. } => operation,
            RetryEvent::IgnoredError { operation, .. } => operation,
        }
    }
}
