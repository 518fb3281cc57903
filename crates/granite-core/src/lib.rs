//! Core infrastructure for the granite HTTP resilience toolkit.
//!
//! This crate provides shared functionality used across all granite crates:
//! - Concrete wire types ([`HttpRequest`], [`HttpResponse`], [`BodySource`])
//! - The error taxonomy ([`Error`]) shared by every policy middleware
//! - Result classification ([`ResultClassifier`], [`FailureClassifier`])
//! - Event system for observability ([`EventListeners`], [`PolicyEvent`])
//! - The injectable metrics recorder ([`MetricsSink`])
//! - Transport boxing ([`BoxTransport`]) for assembling the policy chain
//!
//! The policy crates (`granite-retry`, `granite-breaker`, `granite-chaos`)
//! are Tower services over these concrete types; `granite-client` assembles
//! them around an injected base transport.

pub mod classifier;
pub mod error;
pub mod events;
pub mod metrics;
pub mod transport;
pub mod wire;

pub use classifier::{
    DefaultClassifier, DefaultFailureClassifier, FailureClassifier, FnClassifier,
    FnFailureClassifier, ResultClassifier, Verdict,
};
pub use error::Error;
pub use events::{EventListener, EventListeners, FnListener, PolicyEvent};
pub use self::metrics::{FacadeSink, MetricsSink, NoopSink};
pub use transport::BoxTransport;
pub use wire::{BodySource, ByteStream, HttpRequest, HttpResponse, ResponseBody};
