//! A resilient HTTP client: fluent request construction, a composable
//! policy pipeline, and structured response decoding.
//!
//! Requests flow through an ordered pipeline:
//!
//! ```text
//! RequestBuilder → rate-limit gate → coalescer → hedged executor
//!     → [observability → circuit breaker → retry → chaos → base transport]
//! ```
//!
//! The bracketed portion is the transport chain, assembled once per client;
//! rate limiting, coalescing, hedging, and the per-request deadline execute
//! at this crate's level because they need operation names, replayable
//! bodies, and per-request overrides. The base transport — the thing that
//! actually speaks HTTP — is an injected Tower service over the concrete
//! wire types in [`granite_core`].
//!
//! # Example
//!
//! ```rust,no_run
//! use granite_client::Client;
//! use granite_retry::RetryConfig;
//! use granite_breaker::BreakerConfig;
//! use serde::Deserialize;
//! use std::time::Duration;
//!
//! #[derive(Deserialize)]
//! struct User { id: u64, name: String }
//!
//! # async fn example(transport: granite_core::BoxTransport) -> Result<(), granite_core::Error> {
//! let client = Client::builder()
//!     .transport_boxed(transport)
//!     .base_url("https://api.example.com")
//!     .timeout(Duration::from_secs(30))
//!     .retry(RetryConfig::builder().max_retries(3))
//!     .breaker(BreakerConfig::builder().failure_threshold(5))
//!     .build()?;
//!
//! let user: User = client
//!     .op("get_user")
//!     .path_param("id", "42")
//!     .query("expand", "profile")
//!     .get("/users/{id}")
//!     .await?
//!     .decode()
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod body;
mod builder;
mod client;
mod envelope;
mod multipart;
mod observe;

pub use body::BodyTracker;
pub use builder::RequestBuilder;
pub use client::{Client, ClientBuilder, RequestInterceptor, ResponseInterceptor};
pub use envelope::{Decoded, RequestSummary, ResponseEnvelope, TraceInfo};
pub use observe::{Observe, ObserveLayer};

pub use granite_core::{BodySource, BoxTransport, Error, HttpRequest, HttpResponse};
