//! Concrete wire types carried through the policy chain.
//!
//! The pipeline deliberately works on concrete request/response types rather
//! than generic ones: retry needs to clone requests with fresh body readers,
//! the breaker classifier needs to look at status codes, and the coalescer
//! needs to fingerprint URLs. Keeping the types concrete lets every policy
//! crate share one vocabulary.

use crate::Error;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use http::{HeaderMap, Method, StatusCode, Version};
use parking_lot::Mutex;
use std::fmt;
use std::io;
use std::sync::Arc;
use url::Url;

/// Boxed byte stream used for streaming request and response bodies.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// The request body, in one of four shapes.
///
/// Retry and hedging require a replayable body (`Empty`, `Buffered`, or
/// `Reproducible`). A `SingleShot` stream is accepted only when both are
/// disabled; otherwise the retry engine buffers it on first use via
/// [`BodySource::materialize`].
#[derive(Clone)]
pub enum BodySource {
    /// No body.
    Empty,
    /// Body fully held in memory. `Bytes` is refcounted, so cloning a
    /// buffered body for each attempt shares the same allocation.
    Buffered(Bytes),
    /// A body that can be re-opened for every attempt.
    Reproducible(Arc<dyn Fn() -> ByteStream + Send + Sync>),
    /// A body that can be read exactly once. Shared so that request clones
    /// agree on who consumed it.
    SingleShot(Arc<Mutex<Option<ByteStream>>>),
}

impl BodySource {
    /// Buffered body from anything byte-like.
    pub fn bytes(body: impl Into<Bytes>) -> Self {
        let bytes = body.into();
        if bytes.is_empty() {
            BodySource::Empty
        } else {
            BodySource::Buffered(bytes)
        }
    }

    /// Replayable streaming body: the factory is invoked once per attempt.
    pub fn reproducible<F>(factory: F) -> Self
    where
        F: Fn() -> ByteStream + Send + Sync + 'static,
    {
        BodySource::Reproducible(Arc::new(factory))
    }

    /// One-shot streaming body.
    pub fn single_shot(stream: ByteStream) -> Self {
        BodySource::SingleShot(Arc::new(Mutex::new(Some(stream))))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, BodySource::Empty)
    }

    /// Whether every attempt can observe the same bytes.
    pub fn is_replayable(&self) -> bool {
        !matches!(self, BodySource::SingleShot(_))
    }

    /// The buffered bytes, when the body is held in memory.
    pub fn buffered(&self) -> Option<&Bytes> {
        match self {
            BodySource::Buffered(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Known body length, when cheaply available.
    pub fn len_hint(&self) -> Option<u64> {
        match self {
            BodySource::Empty => Some(0),
            BodySource::Buffered(bytes) => Some(bytes.len() as u64),
            _ => None,
        }
    }

    /// Converts a single-shot stream into a buffered body so the bytes can
    /// be replayed. Replayable variants are left untouched; the stream is
    /// collected at most once. An empty stream collapses to
    /// [`BodySource::Empty`] without retaining an allocation.
    pub async fn materialize(&mut self) -> Result<(), Error> {
        if let BodySource::SingleShot(slot) = self {
            let stream = slot.lock().take().ok_or(Error::BodyConsumed)?;
            let mut stream = stream;
            let mut collected = Vec::new();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(Error::transport)?;
                collected.extend_from_slice(&chunk);
            }
            *self = BodySource::bytes(collected);
        }
        Ok(())
    }

    /// Opens a reader over the body for a single attempt.
    ///
    /// Returns `Ok(None)` for an empty body and [`Error::BodyConsumed`] when
    /// a single-shot stream was already taken.
    pub fn stream(&self) -> Result<Option<ByteStream>, Error> {
        match self {
            BodySource::Empty => Ok(None),
            BodySource::Buffered(bytes) => {
                let bytes = bytes.clone();
                Ok(Some(stream::iter(std::iter::once(Ok(bytes))).boxed()))
            }
            BodySource::Reproducible(factory) => Ok(Some(factory())),
            BodySource::SingleShot(slot) => match slot.lock().take() {
                Some(stream) => Ok(Some(stream)),
                None => Err(Error::BodyConsumed),
            },
        }
    }
}

impl Default for BodySource {
    fn default() -> Self {
        BodySource::Empty
    }
}

impl fmt::Debug for BodySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BodySource::Empty => f.write_str("BodySource::Empty"),
            BodySource::Buffered(bytes) => write!(f, "BodySource::Buffered({} bytes)", bytes.len()),
            BodySource::Reproducible(_) => f.write_str("BodySource::Reproducible"),
            BodySource::SingleShot(_) => f.write_str("BodySource::SingleShot"),
        }
    }
}

/// An outbound request descriptor, immutable once built.
///
/// `operation` is the caller-assigned logical label used as the metric
/// dimension, breaker name, rate-limit key, and latency-tracker key.
#[derive(Clone, Debug)]
pub struct HttpRequest {
    pub operation: String,
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: BodySource,
}

impl HttpRequest {
    pub fn new(operation: impl Into<String>, method: Method, url: Url) -> Self {
        Self {
            operation: operation.into(),
            method,
            url,
            headers: HeaderMap::new(),
            body: BodySource::Empty,
        }
    }
}

/// The response body: either buffered bytes or a live stream.
pub enum ResponseBody {
    Buffered(Bytes),
    Streaming(ByteStream),
}

impl ResponseBody {
    pub fn empty() -> Self {
        ResponseBody::Buffered(Bytes::new())
    }

    pub fn is_buffered(&self) -> bool {
        matches!(self, ResponseBody::Buffered(_))
    }

    /// Drains the body into memory.
    pub async fn collect(self) -> Result<Bytes, Error> {
        match self {
            ResponseBody::Buffered(bytes) => Ok(bytes),
            ResponseBody::Streaming(mut stream) => {
                let mut collected = Vec::new();
                while let Some(chunk) = stream.next().await {
                    let chunk = chunk.map_err(Error::transport)?;
                    collected.extend_from_slice(&chunk);
                }
                Ok(Bytes::from(collected))
            }
        }
    }

    /// The body as a stream, buffered bodies becoming a one-chunk stream.
    pub fn into_stream(self) -> ByteStream {
        match self {
            ResponseBody::Buffered(bytes) if bytes.is_empty() => stream::empty().boxed(),
            ResponseBody::Buffered(bytes) => stream::iter(std::iter::once(Ok(bytes))).boxed(),
            ResponseBody::Streaming(stream) => stream,
        }
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseBody::Buffered(bytes) => write!(f, "ResponseBody::Buffered({} bytes)", bytes.len()),
            ResponseBody::Streaming(_) => f.write_str("ResponseBody::Streaming"),
        }
    }
}

/// A raw response from the base transport, before envelope handling.
#[derive(Debug)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub version: Version,
    pub body: ResponseBody,
}

impl HttpResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            version: Version::HTTP_11,
            body: ResponseBody::empty(),
        }
    }

    /// Response with a buffered body, mostly useful for tests and mocks.
    pub fn with_body(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            version: Version::HTTP_11,
            body: ResponseBody::Buffered(body.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}
