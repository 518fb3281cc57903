//! The fluent request builder.
//!
//! Every setter returns `self`; anything that can fail (header parsing,
//! body serialization, file reads) defers its error to the executor so a
//! chain reads cleanly and errors surface exactly once, from `send`.

use crate::client::{Client, PolicyOverlay};
use crate::envelope::ResponseEnvelope;
use crate::multipart::MultipartForm;
use bytes::Bytes;
use granite_core::{BodySource, ByteStream, Error, HttpRequest};
use granite_hedge::{AdaptiveHedge, HedgeConfig};
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::Method;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

// Everything a URL path segment must escape, per the WHATWG path set plus
// the segment separators themselves.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'`')
    .add(b'#')
    .add(b'?')
    .add(b'{')
    .add(b'}')
    .add(b'/')
    .add(b'%')
    .add(b'\\');

enum PendingBody {
    None,
    Ready {
        body: BodySource,
        content_type: Option<&'static str>,
    },
    Multipart(MultipartForm),
}

/// Builds and dispatches one request.
///
/// Created by [`Client::op`]; finished by one of the executor methods
/// ([`get`](Self::get), [`post`](Self::post), ...), which dispatch through
/// the client's full policy pipeline and return a [`ResponseEnvelope`].
#[must_use = "a RequestBuilder does nothing until an executor method is called"]
pub struct RequestBuilder {
    client: Client,
    operation: String,
    headers: Vec<(HeaderName, HeaderValue)>,
    query: Vec<(String, String)>,
    path_params: Vec<(String, String)>,
    body: PendingBody,
    overlay: PolicyOverlay,
    error: Option<Error>,
}

impl RequestBuilder {
    pub(crate) fn new(client: Client, operation: String) -> Self {
        Self {
            client,
            operation,
            headers: Vec::new(),
            query: Vec::new(),
            path_params: Vec::new(),
            body: PendingBody::None,
            overlay: PolicyOverlay::default(),
            error: None,
        }
    }

    fn fail(&mut self, error: Error) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    /// Binds a `{name}` path placeholder; the value is percent-encoded per
    /// URL path rules.
    pub fn path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_params.push((name.into(), value.into()));
        self
    }

    /// Appends one query parameter. Repeating a key produces a multi-valued
    /// parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Appends several query parameters.
    pub fn queries<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in pairs {
            self.query.push((key.into(), value.into()));
        }
        self
    }

    /// Sets a header. Per-request headers replace client defaults of the
    /// same name; repeating a name within one request appends.
    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        let name = name.as_ref();
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value.as_ref()),
        ) {
            (Ok(name), Ok(value)) => self.headers.push((name, value)),
            (Err(err), _) => self.fail(Error::InvalidHeader {
                name: name.to_string(),
                reason: err.to_string(),
            }),
            (_, Err(err)) => self.fail(Error::InvalidHeader {
                name: name.to_string(),
                reason: err.to_string(),
            }),
        }
        self
    }

    /// Sets several headers.
    pub fn headers<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (name, value) in pairs {
            self = self.header(name, value);
        }
        self
    }

    /// JSON body; sets `application/json` unless a content type was
    /// provided explicitly.
    pub fn body_json<T: Serialize>(mut self, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(bytes) => {
                self.body = PendingBody::Ready {
                    body: BodySource::bytes(bytes),
                    content_type: Some("application/json"),
                };
            }
            Err(err) => self.fail(Error::Encode {
                reason: format!("json: {err}"),
            }),
        }
        self
    }

    /// XML body; sets `application/xml`.
    pub fn body_xml<T: Serialize>(mut self, value: &T) -> Self {
        match quick_xml::se::to_string(value) {
            Ok(text) => {
                self.body = PendingBody::Ready {
                    body: BodySource::bytes(text.into_bytes()),
                    content_type: Some("application/xml"),
                };
            }
            Err(err) => self.fail(Error::Encode {
                reason: format!("xml: {err}"),
            }),
        }
        self
    }

    /// URL-encoded form body; sets `application/x-www-form-urlencoded`.
    pub fn body_form<T: Serialize>(mut self, value: &T) -> Self {
        match serde_urlencoded::to_string(value) {
            Ok(text) => {
                self.body = PendingBody::Ready {
                    body: BodySource::bytes(text.into_bytes()),
                    content_type: Some("application/x-www-form-urlencoded"),
                };
            }
            Err(err) => self.fail(Error::Encode {
                reason: format!("form: {err}"),
            }),
        }
        self
    }

    /// Plain-text body; sets `text/plain`.
    pub fn body_text(mut self, text: impl Into<String>) -> Self {
        self.body = PendingBody::Ready {
            body: BodySource::bytes(text.into().into_bytes()),
            content_type: Some("text/plain; charset=utf-8"),
        };
        self
    }

    /// Raw bytes body; sets `application/octet-stream`.
    pub fn body_bytes(mut self, bytes: impl Into<Bytes>) -> Self {
        self.body = PendingBody::Ready {
            body: BodySource::bytes(bytes),
            content_type: Some("application/octet-stream"),
        };
        self
    }

    /// One-shot streaming body, passed through without a content type.
    ///
    /// Accepted as-is only when retry and hedging are disabled for this
    /// request; otherwise the pipeline buffers the stream on first use so
    /// attempts can replay it.
    pub fn body_stream(mut self, stream: ByteStream) -> Self {
        self.body = PendingBody::Ready {
            body: BodySource::single_shot(stream),
            content_type: None,
        };
        self
    }

    /// Replayable streaming body: the factory is invoked once per attempt.
    pub fn body_reproducible<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> ByteStream + Send + Sync + 'static,
    {
        self.body = PendingBody::Ready {
            body: BodySource::reproducible(factory),
            content_type: None,
        };
        self
    }

    /// Adds a file to a multipart form, read from disk at execute time.
    pub fn file(mut self, field: impl Into<String>, path: impl Into<std::path::PathBuf>) -> Self {
        self.multipart().file(field, path);
        self
    }

    /// Adds streamed content to a multipart form under a file name.
    pub fn file_reader(
        mut self,
        field: impl Into<String>,
        file_name: impl Into<String>,
        content: ByteStream,
    ) -> Self {
        self.multipart().file_reader(field, file_name, content);
        self
    }

    /// Adds a plain field to a multipart form.
    pub fn form_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.multipart().field(name, value);
        self
    }

    fn multipart(&mut self) -> &mut MultipartForm {
        if !matches!(self.body, PendingBody::Multipart(_)) {
            self.body = PendingBody::Multipart(MultipartForm::new());
        }
        match &mut self.body {
            PendingBody::Multipart(form) => form,
            _ => unreachable!("just installed the multipart body"),
        }
    }

    /// Per-request timeout; the effective deadline is
    /// `min(client timeout, this)`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.overlay.timeout = Some(timeout);
        self
    }

    /// Hedges this request with a fixed delay and one duplicate.
    ///
    /// Hedging duplicates wire calls; only enable it for idempotent
    /// operations.
    pub fn hedge(mut self, delay: Duration) -> Self {
        self.overlay.hedge = Some(Arc::new(HedgeConfig::fixed(delay)));
        self
    }

    /// Hedges this request with a full configuration.
    pub fn hedge_config(mut self, config: HedgeConfig) -> Self {
        self.overlay.hedge = Some(Arc::new(config));
        self
    }

    /// Hedges with a delay derived from the operation's observed latency
    /// percentile.
    pub fn adaptive_hedge(mut self, adaptive: AdaptiveHedge) -> Self {
        self.overlay.hedge = Some(Arc::new(
            HedgeConfig::builder().adaptive(adaptive).build(),
        ));
        self
    }

    /// Applies a per-operation rate limit (tokens per second, burst 1).
    pub fn rate_limit(mut self, rate: f64) -> Self {
        self.overlay.rate_limit = Some((rate, 1));
        self
    }

    /// Applies a per-operation rate limit with an explicit burst.
    pub fn rate_limit_with_burst(mut self, rate: f64, burst: u32) -> Self {
        self.overlay.rate_limit = Some((rate, burst));
        self
    }

    /// Coalesces this request with concurrent identical requests: only one
    /// round trip is made and every caller receives the same envelope.
    pub fn coalesce(mut self) -> Self {
        self.overlay.coalesce = true;
        self
    }

    /// Per-request request interceptor.
    pub fn intercept<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut HttpRequest) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.overlay.request_interceptors.push(Arc::new(f));
        self
    }

    /// Per-request response interceptor.
    pub fn intercept_response<F>(mut self, f: F) -> Self
    where
        F: Fn(&ResponseEnvelope) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.overlay.response_interceptors.push(Arc::new(f));
        self
    }

    /// Captures request timing into the envelope's
    /// [`trace_info`](ResponseEnvelope::trace_info).
    pub fn enable_trace(mut self) -> Self {
        self.overlay.trace = true;
        self
    }

    pub async fn get(self, path: &str) -> Result<ResponseEnvelope, Error> {
        self.send(Method::GET, path).await
    }

    pub async fn post(self, path: &str) -> Result<ResponseEnvelope, Error> {
        self.send(Method::POST, path).await
    }

    pub async fn put(self, path: &str) -> Result<ResponseEnvelope, Error> {
        self.send(Method::PUT, path).await
    }

    pub async fn patch(self, path: &str) -> Result<ResponseEnvelope, Error> {
        self.send(Method::PATCH, path).await
    }

    pub async fn delete(self, path: &str) -> Result<ResponseEnvelope, Error> {
        self.send(Method::DELETE, path).await
    }

    /// Dispatches with an arbitrary method.
    pub async fn send(mut self, method: Method, path: &str) -> Result<ResponseEnvelope, Error> {
        if let Some(error) = self.error.take() {
            return Err(error);
        }

        let url = self.build_url(path)?;

        let (body, content_type) = match self.body {
            PendingBody::None => (BodySource::Empty, None),
            PendingBody::Ready { body, content_type } => {
                (body, content_type.map(|ct| ct.to_string()))
            }
            PendingBody::Multipart(form) => {
                let (content_type, bytes) = form.encode().await?;
                (BodySource::bytes(bytes), Some(content_type))
            }
        };

        let mut request = HttpRequest::new(self.operation, method, url);
        request.body = body;

        // Client defaults first; per-request headers replace same-named
        // defaults but may themselves be multi-valued.
        let mut headers = self.client.inner.default_headers.clone();
        let mut replaced: HashSet<HeaderName> = HashSet::new();
        for (name, value) in self.headers {
            if replaced.insert(name.clone()) {
                headers.remove(&name);
            }
            headers.append(name, value);
        }
        if let Some(content_type) = content_type {
            if !headers.contains_key(CONTENT_TYPE) {
                if let Ok(value) = HeaderValue::from_str(&content_type) {
                    headers.insert(CONTENT_TYPE, value);
                }
            }
        }
        request.headers = headers;

        self.client.execute(request, self.overlay).await
    }

    fn build_url(&self, path: &str) -> Result<Url, Error> {
        let mut rendered = path.to_string();
        for (name, value) in &self.path_params {
            let placeholder = format!("{{{name}}}");
            let encoded = utf8_percent_encode(value, PATH_SEGMENT).to_string();
            rendered = rendered.replace(&placeholder, &encoded);
        }

        let mut url = match &self.client.inner.base_url {
            Some(base) => base.join(&rendered).map_err(|err| Error::InvalidUrl {
                url: rendered.clone(),
                reason: err.to_string(),
            })?,
            None => Url::parse(&rendered).map_err(|err| Error::InvalidUrl {
                url: rendered.clone(),
                reason: err.to_string(),
            })?,
        };

        if !self.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }
}

impl std::fmt::Debug for RequestBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestBuilder")
            .field("operation", &self.operation)
            .finish_non_exhaustive()
    }
}
