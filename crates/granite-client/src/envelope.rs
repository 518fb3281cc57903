//! The response envelope: cached body, lazy decoding, trace attachment.
//!
//! The envelope is cheaply cloneable (shared inner); coalesced callers all
//! hold the same envelope and therefore observe identical response
//! metadata and bytes. The body is read once and cached: the first
//! [`ResponseEnvelope::body`] call consumes the underlying stream, later
//! calls return the cached bytes.

use bytes::Bytes;
use granite_core::{Error, HttpResponse, ResponseBody};
use http::{HeaderMap, Method, StatusCode, Version};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell};
use url::Url;

/// What was sent, kept for `curl_command` and debugging.
#[derive(Debug, Clone)]
pub struct RequestSummary {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    /// Present only when the request body was buffered.
    pub body: Option<Bytes>,
}

/// Request timing captured by the execution pipeline.
#[derive(Debug, Clone)]
pub struct TraceInfo {
    pub operation: String,
    /// Time from dispatch to response headers.
    pub time_to_headers: Duration,
}

/// Outcome of a unified decode: exactly one variant is populated, chosen by
/// status class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded<T, E> {
    /// 2xx: the success target.
    Success(T),
    /// ≥ 400: the error target.
    Error(E),
}

struct EnvelopeInner {
    status: StatusCode,
    headers: HeaderMap,
    version: Version,
    body: Mutex<Option<ResponseBody>>,
    cache: OnceCell<Bytes>,
    request: RequestSummary,
    trace: Option<TraceInfo>,
}

/// A response with cached body and structured decoding.
#[derive(Clone)]
pub struct ResponseEnvelope {
    inner: Arc<EnvelopeInner>,
}

impl ResponseEnvelope {
    pub(crate) fn new(
        response: HttpResponse,
        request: RequestSummary,
        trace: Option<TraceInfo>,
    ) -> Self {
        Self {
            inner: Arc::new(EnvelopeInner {
                status: response.status,
                headers: response.headers,
                version: response.version,
                body: Mutex::new(Some(response.body)),
                cache: OnceCell::new(),
                request,
                trace,
            }),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.inner.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.inner.headers
    }

    pub fn version(&self) -> Version {
        self.inner.version
    }

    /// True for 2xx responses.
    pub fn is_success(&self) -> bool {
        self.inner.status.is_success()
    }

    /// True for responses with status ≥ 400.
    pub fn is_error(&self) -> bool {
        self.inner.status.as_u16() >= 400
    }

    /// The response bytes. The first call drains and closes the underlying
    /// stream; every later call returns the cache.
    pub async fn body(&self) -> Result<Bytes, Error> {
        self.inner
            .cache
            .get_or_try_init(|| async {
                match self.inner.body.lock().await.take() {
                    Some(body) => body.collect().await,
                    None => Err(Error::BodyConsumed),
                }
            })
            .await
            .cloned()
    }

    /// The response body as UTF-8 text (lossy).
    pub async fn text(&self) -> Result<String, Error> {
        let bytes = self.body().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Decodes the success target. Fails with
    /// [`Error::UnexpectedStatus`] on non-2xx responses; use
    /// [`decode_error`](Self::decode_error) or [`decode_as`](Self::decode_as)
    /// for those.
    pub async fn decode<T: DeserializeOwned>(&self) -> Result<T, Error> {
        if !self.is_success() {
            return Err(Error::UnexpectedStatus {
                status: self.inner.status,
            });
        }
        self.decode_body().await
    }

    /// Decodes the error target. Fails with [`Error::UnexpectedStatus`]
    /// unless the status is ≥ 400.
    pub async fn decode_error<E: DeserializeOwned>(&self) -> Result<E, Error> {
        if !self.is_error() {
            return Err(Error::UnexpectedStatus {
                status: self.inner.status,
            });
        }
        self.decode_body().await
    }

    /// Unified decode: success target on 2xx, error target on ≥ 400.
    pub async fn decode_as<T, E>(&self) -> Result<Decoded<T, E>, Error>
    where
        T: DeserializeOwned,
        E: DeserializeOwned,
    {
        if self.is_success() {
            Ok(Decoded::Success(self.decode_body().await?))
        } else if self.is_error() {
            Ok(Decoded::Error(self.decode_body().await?))
        } else {
            Err(Error::UnexpectedStatus {
                status: self.inner.status,
            })
        }
    }

    /// Content-type dispatch: `application/json` and `application/xml` /
    /// `text/xml` decode natively, anything else defaults to JSON.
    async fn decode_body<T: DeserializeOwned>(&self) -> Result<T, Error> {
        let bytes = self.body().await?;
        let content_type = self
            .inner
            .headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();

        if content_type.starts_with("application/xml") || content_type.starts_with("text/xml") {
            let text = std::str::from_utf8(&bytes).map_err(|err| Error::Decode {
                reason: format!("xml body is not valid utf-8: {err}"),
            })?;
            quick_xml::de::from_str(text).map_err(|err| Error::Decode {
                reason: format!("xml: {err}"),
            })
        } else {
            serde_json::from_slice(&bytes).map_err(|err| Error::Decode {
                reason: format!("json: {err}"),
            })
        }
    }

    /// A copy-pastable `curl` invocation reproducing the request.
    pub fn curl_command(&self) -> String {
        use std::fmt::Write as _;

        let request = &self.inner.request;
        let mut cmd = format!("curl -X {} '{}'", request.method, request.url);
        for (name, value) in request.headers.iter() {
            let value = value.to_str().unwrap_or("<binary>");
            let _ = write!(cmd, " -H '{name}: {value}'");
        }
        if let Some(body) = &request.body {
            if !body.is_empty() {
                let _ = write!(cmd, " -d '{}'", String::from_utf8_lossy(body));
            }
        }
        cmd
    }

    /// Timing captured for this request, when tracing was enabled.
    pub fn trace_info(&self) -> Option<&TraceInfo> {
        self.inner.trace.as_ref()
    }
}

impl std::fmt::Debug for ResponseEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseEnvelope")
            .field("status", &self.inner.status)
            .field("version", &self.inner.version)
            .finish_non_exhaustive()
    }
}
