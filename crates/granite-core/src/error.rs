//! Error taxonomy shared across the toolkit.
//!
//! A single error type flows through the whole pipeline so that policy
//! middleware can classify results without downcasting through layers of
//! wrappers. The type is `Clone` (sources are `Arc`-wrapped) because results
//! are broadcast to coalesce waiters and kept for hedge bookkeeping.

use http::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the granite pipeline.
///
/// Transport errors are returned verbatim, wrapped only to carry the source.
/// Policy rejections (`RateLimited`, `CircuitOpen`) are sentinels: they are
/// never retried and never counted as breaker failures.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum Error {
    /// The base transport failed to complete the round trip.
    #[error("transport error: {source}")]
    Transport {
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync>,
    },

    /// A single attempt exceeded its transport-level timeout.
    ///
    /// Attempt timeouts are transient and eligible for retry, unlike
    /// [`Error::DeadlineExceeded`].
    #[error("attempt timed out after {elapsed:?}")]
    Timeout { elapsed: Duration },

    /// The composed request deadline (`min(client timeout, request timeout)`)
    /// elapsed. Treated as caller intent: never retried, never counted by
    /// the circuit breaker.
    #[error("request deadline exceeded")]
    DeadlineExceeded,

    /// The caller abandoned the request.
    #[error("request cancelled")]
    Cancelled,

    /// The client- or operation-scoped rate limiter rejected the request.
    #[error("rate limit exceeded")]
    RateLimited,

    /// The circuit breaker for this operation is open; the request never
    /// touched the wire.
    #[error("circuit breaker open for operation {operation:?}")]
    CircuitOpen { operation: String },

    /// A fault injected by the chaos layer. Test environments only.
    #[error("chaos fault injected")]
    ChaosInjected,

    /// A single-shot body stream was already consumed and cannot be replayed.
    #[error("request body already consumed")]
    BodyConsumed,

    /// The client was misconfigured, e.g. built without a base transport.
    #[error("invalid client configuration: {reason}")]
    Config { reason: String },

    /// The request URL could not be built.
    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// A header name or value was rejected.
    #[error("invalid header {name:?}: {reason}")]
    InvalidHeader { name: String, reason: String },

    /// Request body encoding failed (deferred from the builder to execute).
    #[error("body encoding failed: {reason}")]
    Encode { reason: String },

    /// Response body decoding failed.
    #[error("response decoding failed: {reason}")]
    Decode { reason: String },

    /// A decode target was applied to the wrong status class, e.g.
    /// decoding a success target out of an error response.
    #[error("unexpected status {status} for requested decode")]
    UnexpectedStatus { status: StatusCode },

    /// The coalesce leader disappeared without broadcasting a result.
    #[error("coalesced request lost its in-flight leader")]
    CoalesceLost,
}

impl Error {
    /// Wraps an arbitrary transport failure.
    pub fn transport<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Transport {
            source: Arc::new(source),
        }
    }

    /// True for the policy-rejection sentinels, which never touch the wire.
    pub fn is_policy_rejection(&self) -> bool {
        matches!(self, Error::RateLimited | Error::CircuitOpen { .. })
    }

    /// True when the error reflects caller intent (cancellation or the
    /// composed deadline) rather than a fault of the remote service.
    pub fn is_caller_intent(&self) -> bool {
        matches!(self, Error::Cancelled | Error::DeadlineExceeded)
    }
}
