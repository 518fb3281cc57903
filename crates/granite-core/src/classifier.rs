//! Result classification for retry and circuit breaker decisions.
//!
//! Two classifier families share this module. [`ResultClassifier`] produces a
//! three-way [`Verdict`] consumed by the retry engine and the hedge winner
//! selection. [`FailureClassifier`] produces the boolean consumed by the
//! circuit breaker; the two intentionally disagree about 429 (a rate-limit
//! signal, not an unhealthy upstream) and 500 (a server bug, unlikely to
//! self-heal, but still a breaker failure).
//!
//! Classification prefers structured inspection: walk the `source()` chain
//! and match on `io::ErrorKind`. String-pattern matching exists as a last
//! resort for wrapped errors that lost their structured type, and should be
//! treated as an escape hatch rather than the mechanism of record.

use crate::{Error, HttpResponse};
use std::io;
use std::sync::Arc;

/// Outcome of classifying one attempt's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The result is usable; hand it to the caller as-is.
    Success,
    /// Transient failure; another attempt may succeed.
    Retryable,
    /// Terminal failure; further attempts would not help.
    Permanent,
}

/// Classifies an attempt result into a [`Verdict`].
pub trait ResultClassifier: Send + Sync {
    fn classify(&self, result: &Result<HttpResponse, Error>) -> Verdict;
}

/// Decides whether a result counts as a circuit-breaker failure.
pub trait FailureClassifier: Send + Sync {
    fn is_failure(&self, result: &Result<HttpResponse, Error>) -> bool;
}

/// Status codes the default classifier treats as retryable.
///
/// 500 is deliberately absent: it usually indicates a server bug rather than
/// transient overload.
pub const DEFAULT_RETRYABLE_STATUSES: &[u16] = &[429, 502, 503, 504];

/// The default retry classifier.
///
/// # Behavior
///
/// - Responses with a status outside the retryable set → [`Verdict::Success`]
///   (the caller inspects the response, including 4xx/500).
/// - 429/502/503/504 → [`Verdict::Retryable`].
/// - Cancellation and deadline exhaustion → [`Verdict::Permanent`].
/// - Policy rejections (`RateLimited`, `CircuitOpen`) → [`Verdict::Permanent`].
/// - Transport errors → structured `io::ErrorKind` walk, then string
///   patterns; unknown errors are retryable (bias toward liveness at the
///   network edge).
#[derive(Debug, Clone)]
pub struct DefaultClassifier {
    retryable_statuses: Vec<u16>,
}

impl Default for DefaultClassifier {
    fn default() -> Self {
        Self {
            retryable_statuses: DEFAULT_RETRYABLE_STATUSES.to_vec(),
        }
    }
}

impl DefaultClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the retryable status-code set.
    pub fn with_retryable_statuses(statuses: impl Into<Vec<u16>>) -> Self {
        Self {
            retryable_statuses: statuses.into(),
        }
    }
}

impl ResultClassifier for DefaultClassifier {
    fn classify(&self, result: &Result<HttpResponse, Error>) -> Verdict {
        match result {
            Ok(response) => {
                if self.retryable_statuses.contains(&response.status.as_u16()) {
                    Verdict::Retryable
                } else {
                    Verdict::Success
                }
            }
            Err(error) => classify_error(error),
        }
    }
}

fn classify_error(error: &Error) -> Verdict {
    match error {
        Error::Cancelled | Error::DeadlineExceeded => Verdict::Permanent,
        Error::RateLimited | Error::CircuitOpen { .. } => Verdict::Permanent,
        Error::ChaosInjected => Verdict::Retryable,
        Error::Timeout { .. } => Verdict::Retryable,
        Error::Transport { source } => classify_transport(source.as_ref()),
        _ => Verdict::Permanent,
    }
}

fn classify_transport(error: &(dyn std::error::Error + 'static)) -> Verdict {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(error);
    while let Some(err) = current {
        if let Some(io_err) = err.downcast_ref::<io::Error>() {
            match io_err.kind() {
                io::ErrorKind::TimedOut
                | io::ErrorKind::ConnectionRefused
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::NotConnected
                | io::ErrorKind::UnexpectedEof
                | io::ErrorKind::Interrupted => return Verdict::Retryable,
                io::ErrorKind::PermissionDenied => return Verdict::Permanent,
                _ => break,
            }
        }
        current = err.source();
    }
    classify_by_text(error)
}

// Last-resort patterns for errors whose structured type was erased by
// wrapping. Permanent patterns win over retryable ones so that, e.g.,
// "no such host" is not rescued by a generic "host" match.
const PERMANENT_PATTERNS: &[&str] = &[
    "certificate",
    "unknown ca",
    "self signed",
    "no such host",
    "nxdomain",
    "name or service not known",
    "permission denied",
    "no route to host",
    "protocol error",
    "invalid http",
    "unsupported scheme",
];

const RETRYABLE_PATTERNS: &[&str] = &[
    "timeout",
    "timed out",
    "etimedout",
    "connection refused",
    "connection reset",
    "connection aborted",
    "broken pipe",
    "unexpected eof",
    "eof",
    "network is unreachable",
    "host is unreachable",
    "temporary failure",
    "try again",
    "dns",
];

fn classify_by_text(error: &(dyn std::error::Error + 'static)) -> Verdict {
    let mut text = String::new();
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(error);
    while let Some(err) = current {
        text.push_str(&err.to_string().to_ascii_lowercase());
        text.push('\n');
        current = err.source();
    }

    if PERMANENT_PATTERNS.iter().any(|p| text.contains(p)) {
        return Verdict::Permanent;
    }
    if RETRYABLE_PATTERNS.iter().any(|p| text.contains(p)) {
        return Verdict::Retryable;
    }
    // An error object is present but matches nothing we recognize. Network
    // edges skew transient, so keep the request alive.
    Verdict::Retryable
}

/// A retry classifier backed by a closure.
#[derive(Clone)]
pub struct FnClassifier<F> {
    f: Arc<F>,
}

impl<F> FnClassifier<F>
where
    F: Fn(&Result<HttpResponse, Error>) -> Verdict + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f: Arc::new(f) }
    }
}

impl<F> ResultClassifier for FnClassifier<F>
where
    F: Fn(&Result<HttpResponse, Error>) -> Verdict + Send + Sync,
{
    fn classify(&self, result: &Result<HttpResponse, Error>) -> Verdict {
        (self.f)(result)
    }
}

/// The default breaker classifier.
///
/// Counts 5xx responses and transport-level failures. Excludes 429 and other
/// 4xx (the client's fault, or backpressure), caller-intent errors, and the
/// policy-rejection sentinels (they *are* the limiter and the breaker).
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultFailureClassifier;

impl FailureClassifier for DefaultFailureClassifier {
    fn is_failure(&self, result: &Result<HttpResponse, Error>) -> bool {
        match result {
            Ok(response) => response.status.is_server_error(),
            Err(error) => !error.is_caller_intent() && !error.is_policy_rejection(),
        }
    }
}

/// A breaker classifier backed by a closure.
#[derive(Clone)]
pub struct FnFailureClassifier<F> {
    f: Arc<F>,
}

impl<F> FnFailureClassifier<F>
where
    F: Fn(&Result<HttpResponse, Error>) -> bool + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f: Arc::new(f) }
    }
}

impl<F> FailureClassifier for FnFailureClassifier<F>
where
    F: Fn(&Result<HttpResponse, Error>) -> bool + Send + Sync,
{
    fn is_failure(&self, result: &Result<HttpResponse, Error>) -> bool {
        (self.f)(result)
    }
}
