//! The client: policy chain assembly and request execution.
//!
//! The transport chain is assembled once at build time, innermost first:
//! base transport ← chaos ← retry ← breaker ← observability. Disabled
//! policies are simply not installed, so a minimal client pays nothing for
//! them. Rate limiting, coalescing, hedging, and the per-request deadline
//! run here in [`Client::execute`], outside the chain, because they need
//! operation names, replayable bodies, and per-request overrides that a
//! transport wrapper cannot carry cleanly.

use crate::builder::RequestBuilder;
use crate::envelope::{RequestSummary, ResponseEnvelope, TraceInfo};
use crate::observe::ObserveLayer;
use granite_breaker::{BreakerConfigBuilder, BreakerRegistry};
use granite_chaos::ChaosConfigBuilder;
use granite_coalesce::{fingerprint, SingleFlight};
use granite_core::metrics::{names, noop_sink, SharedSink};
use granite_core::{BoxTransport, Error, HttpRequest, HttpResponse, MetricsSink};
use granite_hedge::{HedgeConfig, HedgedExecutor, LatencyTracker};
use granite_ratelimit::{RateLimitConfigBuilder, RateLimitGate};
use granite_retry::RetryConfigBuilder;
use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_layer::Layer;
use tower_service::Service;
use url::Url;

/// Inspects or rewrites a request before dispatch; an error aborts the
/// request.
pub type RequestInterceptor = Arc<dyn Fn(&mut HttpRequest) -> Result<(), Error> + Send + Sync>;

/// Inspects a response envelope after dispatch; an error aborts the
/// request with the interceptor's error.
pub type ResponseInterceptor = Arc<dyn Fn(&ResponseEnvelope) -> Result<(), Error> + Send + Sync>;

/// Per-request policy overrides collected by the request builder.
#[derive(Default)]
pub(crate) struct PolicyOverlay {
    pub(crate) timeout: Option<Duration>,
    pub(crate) hedge: Option<Arc<HedgeConfig>>,
    pub(crate) rate_limit: Option<(f64, u32)>,
    pub(crate) coalesce: bool,
    pub(crate) trace: bool,
    pub(crate) request_interceptors: Vec<RequestInterceptor>,
    pub(crate) response_interceptors: Vec<ResponseInterceptor>,
}

pub(crate) struct ClientInner {
    pub(crate) chain: BoxTransport,
    pub(crate) base_url: Option<Url>,
    pub(crate) default_headers: HeaderMap,
    pub(crate) timeout: Option<Duration>,
    pub(crate) gate: RateLimitGate,
    pub(crate) tracker: Arc<LatencyTracker>,
    pub(crate) coalescer: SingleFlight<Result<ResponseEnvelope, Error>>,
    pub(crate) sink: SharedSink,
    pub(crate) breakers: Option<Arc<BreakerRegistry>>,
    pub(crate) request_interceptors: Vec<RequestInterceptor>,
    pub(crate) response_interceptors: Vec<ResponseInterceptor>,
}

/// A resilient HTTP client.
///
/// Cheap to clone and safe to share across tasks: all state is behind one
/// `Arc`, and every mutable structure inside carries its own lock.
#[derive(Clone)]
pub struct Client {
    pub(crate) inner: Arc<ClientInner>,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Starts a request under the given operation name.
    ///
    /// The operation name keys everything per-operation: metrics, the
    /// circuit breaker, per-operation rate limits, and the latency window
    /// used by adaptive hedging.
    pub fn op(&self, operation: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(self.clone(), operation.into())
    }

    /// The breaker registry, when circuit breaking is configured.
    pub fn breakers(&self) -> Option<&Arc<BreakerRegistry>> {
        self.inner.breakers.as_ref()
    }

    /// The latency tracker feeding adaptive hedging.
    pub fn latency_tracker(&self) -> &Arc<LatencyTracker> {
        &self.inner.tracker
    }

    pub(crate) async fn execute(
        &self,
        mut request: HttpRequest,
        overlay: PolicyOverlay,
    ) -> Result<ResponseEnvelope, Error> {
        let PolicyOverlay {
            timeout,
            hedge,
            rate_limit,
            coalesce,
            trace,
            request_interceptors,
            response_interceptors,
        } = overlay;

        for interceptor in self
            .inner
            .request_interceptors
            .iter()
            .chain(request_interceptors.iter())
        {
            interceptor(&mut request)?;
        }

        // The builder can only shorten the effective deadline, never
        // extend it past the client-level timeout.
        let deadline = match (self.inner.timeout, timeout) {
            (Some(client), Some(request)) => Some(client.min(request)),
            (client, request) => client.or(request),
        };

        let inner = Arc::clone(&self.inner);
        let work = async move {
            inner.gate.admit(&request.operation, rate_limit).await?;

            if coalesce {
                // Fingerprinting needs the body bytes; coalesced requests
                // are buffered by contract.
                request.body.materialize().await?;
                let body = request.body.buffered().cloned().unwrap_or_default();
                let key = fingerprint(&request.method, &request.url, &body);
                let operation = request.operation.clone();

                let flight = dispatch(Arc::clone(&inner), request, hedge, trace);
                let (result, joined) = inner
                    .coalescer
                    .run(key, flight)
                    .await
                    .map_err(|_| Error::CoalesceLost)?;
                if joined {
                    inner.sink.counter(
                        names::COALESCE_JOINED,
                        &[("operation", &operation)],
                        1,
                    );
                    tracing::debug!(
                        operation = %operation,
                        "joined in-flight identical request"
                    );
                }
                result
            } else {
                dispatch(inner, request, hedge, trace).await
            }
        };

        let envelope = match deadline {
            Some(deadline) => match tokio::time::timeout(deadline, work).await {
                Ok(result) => result?,
                Err(_) => return Err(Error::DeadlineExceeded),
            },
            None => work.await?,
        };

        for interceptor in &response_interceptors {
            interceptor(&envelope)?;
        }
        Ok(envelope)
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.inner.base_url)
            .field("timeout", &self.inner.timeout)
            .finish_non_exhaustive()
    }
}

/// One traversal of hedge → chain, producing the envelope.
async fn dispatch(
    inner: Arc<ClientInner>,
    request: HttpRequest,
    hedge: Option<Arc<HedgeConfig>>,
    trace: bool,
) -> Result<ResponseEnvelope, Error> {
    let operation = request.operation.clone();
    let summary = RequestSummary {
        method: request.method.clone(),
        url: request.url.clone(),
        headers: request.headers.clone(),
        body: request.body.buffered().cloned(),
    };
    let started = Instant::now();

    let result = match hedge {
        Some(config) => {
            let executor = HedgedExecutor::new(config, Arc::clone(&inner.tracker));
            executor.execute(inner.chain.clone(), request).await
        }
        None => {
            let outcome = inner.chain.round_trip(request).await;
            if outcome.is_ok() {
                // Live samples keep the adaptive-hedge window current even
                // for requests that were not hedged.
                inner.tracker.record(&operation, started.elapsed());
            }
            outcome
        }
    };

    let response = result?;
    let trace = trace.then(|| TraceInfo {
        operation: operation.clone(),
        time_to_headers: started.elapsed(),
    });
    let envelope = ResponseEnvelope::new(response, summary, trace);

    for interceptor in &inner.response_interceptors {
        interceptor(&envelope)?;
    }
    Ok(envelope)
}

/// Builder for [`Client`].
///
/// ```rust,no_run
/// use granite_client::Client;
/// use granite_retry::RetryConfig;
/// use granite_breaker::BreakerConfig;
/// use std::time::Duration;
///
/// # fn transport() -> granite_core::BoxTransport { unimplemented!() }
/// let client = Client::builder()
///     .transport_boxed(transport())
///     .base_url("https://api.example.com")
///     .timeout(Duration::from_secs(30))
///     .retry(RetryConfig::builder().max_retries(3))
///     .breaker(BreakerConfig::builder().failure_threshold(5))
///     .build()
///     .unwrap();
/// # let _ = client;
/// ```
pub struct ClientBuilder {
    transport: Option<BoxTransport>,
    base_url: Option<String>,
    default_headers: Vec<(String, String)>,
    timeout: Option<Duration>,
    retry: Option<RetryConfigBuilder>,
    breaker: Option<BreakerConfigBuilder>,
    rate_limit: Option<RateLimitConfigBuilder>,
    chaos: Option<ChaosConfigBuilder>,
    sink: SharedSink,
    tracker: Option<Arc<LatencyTracker>>,
    request_interceptors: Vec<RequestInterceptor>,
    response_interceptors: Vec<ResponseInterceptor>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            transport: None,
            base_url: None,
            default_headers: Vec::new(),
            timeout: None,
            retry: None,
            breaker: None,
            rate_limit: None,
            chaos: None,
            sink: noop_sink(),
            tracker: None,
            request_interceptors: Vec::new(),
            response_interceptors: Vec::new(),
        }
    }

    /// The base transport performing raw round trips. Required.
    ///
    /// The transport owns connections and pooling; proxy environment
    /// variables (`HTTP_PROXY`, `HTTPS_PROXY`, `NO_PROXY`) are honored by
    /// the transport when its proxy-from-environment support is enabled.
    pub fn transport<S>(mut self, service: S) -> Self
    where
        S: Service<HttpRequest, Response = HttpResponse, Error = Error>
            + Clone
            + Send
            + Sync
            + 'static,
        S::Future: Send + 'static,
    {
        self.transport = Some(BoxTransport::new(service));
        self
    }

    /// A pre-boxed transport.
    pub fn transport_boxed(mut self, transport: BoxTransport) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Base URL that request paths are joined against.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// A header applied to every request; per-request headers win.
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    /// Client-level timeout. The effective deadline per request is
    /// `min(client timeout, request timeout)`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Enables retrying with the given configuration.
    pub fn retry(mut self, retry: RetryConfigBuilder) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Enables circuit breaking with the given configuration.
    pub fn breaker(mut self, breaker: BreakerConfigBuilder) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// Enables rate limiting with the given configuration.
    pub fn rate_limit(mut self, rate_limit: RateLimitConfigBuilder) -> Self {
        self.rate_limit = Some(rate_limit);
        self
    }

    /// Installs the chaos layer. Test environments only.
    pub fn chaos(mut self, chaos: ChaosConfigBuilder) -> Self {
        self.chaos = Some(chaos);
        self
    }

    /// Metrics sink shared by every policy in the pipeline.
    pub fn metrics(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Replaces the process-wide latency tracker for this client.
    pub fn latency_tracker(mut self, tracker: Arc<LatencyTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Client-level request interceptor, run before every dispatch.
    pub fn intercept_request<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut HttpRequest) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.request_interceptors.push(Arc::new(f));
        self
    }

    /// Client-level response interceptor, run on every envelope.
    pub fn intercept_response<F>(mut self, f: F) -> Self
    where
        F: Fn(&ResponseEnvelope) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.response_interceptors.push(Arc::new(f));
        self
    }

    pub fn build(self) -> Result<Client, Error> {
        let transport = self.transport.ok_or_else(|| Error::Config {
            reason: "a base transport is required".to_string(),
        })?;

        let base_url = match self.base_url {
            Some(raw) => Some(Url::parse(&raw).map_err(|err| Error::InvalidUrl {
                url: raw,
                reason: err.to_string(),
            })?),
            None => None,
        };

        let mut default_headers = HeaderMap::new();
        for (name, value) in self.default_headers {
            let header = HeaderName::from_bytes(name.as_bytes()).map_err(|err| {
                Error::InvalidHeader {
                    name: name.clone(),
                    reason: err.to_string(),
                }
            })?;
            let value = HeaderValue::from_str(&value).map_err(|err| Error::InvalidHeader {
                name,
                reason: err.to_string(),
            })?;
            default_headers.append(header, value);
        }

        let sink = self.sink;

        // Assemble innermost-first: base ← chaos ← retry ← breaker ←
        // observability. Policies that are not configured are elided.
        let mut chain = transport;
        if let Some(chaos) = self.chaos {
            chain = BoxTransport::new(chaos.sink(sink.clone()).build().layer(chain));
        }
        if let Some(retry) = self.retry {
            let layer = retry.sink(sink.clone()).build();
            if layer.is_enabled() {
                chain = BoxTransport::new(layer.layer(chain));
            }
        }
        let mut breakers = None;
        if let Some(breaker) = self.breaker {
            let layer = breaker.sink(sink.clone()).build();
            breakers = Some(layer.registry());
            chain = BoxTransport::new(layer.layer(chain));
        }
        chain = BoxTransport::new(ObserveLayer::new(sink.clone()).layer(chain));

        let gate = match self.rate_limit {
            Some(rate_limit) => rate_limit.sink(sink.clone()).build(),
            None => RateLimitGate::disabled(),
        };

        Ok(Client {
            inner: Arc::new(ClientInner {
                chain,
                base_url,
                default_headers,
                timeout: self.timeout,
                gate,
                tracker: self.tracker.unwrap_or_else(granite_hedge::default_tracker),
                coalescer: SingleFlight::new(),
                sink,
                breakers,
                request_interceptors: self.request_interceptors,
                response_interceptors: self.response_interceptors,
            }),
        })
    }
}

impl std::fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
