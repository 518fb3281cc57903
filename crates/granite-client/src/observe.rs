//! Observability wrap: the outermost layer of the transport chain.
//!
//! Opens a span per round trip, maintains the `active_requests` gauge,
//! records duration/ttfb/body-size histograms through the injected
//! [`granite_core::MetricsSink`], and wraps streaming response bodies in a
//! [`BodyTracker`] so `request.duration` covers the full transfer rather
//! than just the response head.

use crate::body::BodyTracker;
use futures::future::BoxFuture;
use granite_core::metrics::{names, SharedSink};
use granite_core::{Error, HttpRequest, HttpResponse, ResponseBody};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tower::ServiceExt;
use tower_layer::Layer;
use tower_service::Service;
use tracing::Instrument;

/// Layer installing [`Observe`] at the top of the chain.
#[derive(Clone)]
pub struct ObserveLayer {
    sink: SharedSink,
    active: Arc<AtomicI64>,
}

impl ObserveLayer {
    pub fn new(sink: SharedSink) -> Self {
        Self {
            sink,
            active: Arc::new(AtomicI64::new(0)),
        }
    }
}

impl<S> Layer<S> for ObserveLayer {
    type Service = Observe<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Observe {
            inner,
            sink: self.sink.clone(),
            active: Arc::clone(&self.active),
        }
    }
}

/// The observability service.
pub struct Observe<S> {
    inner: S,
    sink: SharedSink,
    active: Arc<AtomicI64>,
}

impl<S: Clone> Clone for Observe<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            sink: self.sink.clone(),
            active: Arc::clone(&self.active),
        }
    }
}

impl<S> Service<HttpRequest> for Observe<S>
where
    S: Service<HttpRequest, Response = HttpResponse, Error = Error> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = HttpResponse;
    type Error = Error;
    type Future = BoxFuture<'static, Result<HttpResponse, Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: HttpRequest) -> Self::Future {
        let clone = self.inner.clone();
        let service = std::mem::replace(&mut self.inner, clone);
        let sink = self.sink.clone();
        let active = Arc::clone(&self.active);

        let span = tracing::debug_span!(
            "http_request",
            operation = %request.operation,
            method = %request.method,
        );

        Box::pin(
            async move {
                let operation = request.operation.clone();

                let now_active = active.fetch_add(1, Ordering::SeqCst) + 1;
                sink.gauge(names::ACTIVE_REQUESTS, &[], now_active as f64);
                if let Some(len) = request.body.len_hint() {
                    if len > 0 {
                        sink.histogram(
                            names::REQUEST_BODY_SIZE,
                            &[("operation", &operation)],
                            len as f64,
                        );
                    }
                }

                let started = Instant::now();
                let result = service.oneshot(request).await;

                let now_active = active.fetch_sub(1, Ordering::SeqCst) - 1;
                sink.gauge(names::ACTIVE_REQUESTS, &[], now_active as f64);

                match result {
                    Ok(mut response) => {
                        let ttfb = started.elapsed();
                        sink.histogram(
                            names::TTFB,
                            &[("operation", &operation)],
                            ttfb.as_secs_f64(),
                        );
                        tracing::debug!(
                            status = response.status.as_u16(),
                            ttfb_ms = ttfb.as_millis() as u64,
                            "response headers received"
                        );

                        response.body = match response.body {
                            ResponseBody::Buffered(bytes) => {
                                record_complete(&sink, &operation, started, bytes.len() as u64, None);
                                ResponseBody::Buffered(bytes)
                            }
                            ResponseBody::Streaming(stream) => {
                                let sink = sink.clone();
                                let operation = operation.clone();
                                ResponseBody::Streaming(
                                    BodyTracker::new(stream, move |bytes, error| {
                                        record_complete(
                                            &sink,
                                            &operation,
                                            started,
                                            bytes,
                                            error.as_deref(),
                                        );
                                    })
                                    .into_stream(),
                                )
                            }
                        };
                        Ok(response)
                    }
                    Err(err) => {
                        sink.histogram(
                            names::REQUEST_DURATION,
                            &[("operation", &operation), ("outcome", "error")],
                            started.elapsed().as_secs_f64(),
                        );
                        tracing::debug!(error = %err, "round trip failed");
                        Err(err)
                    }
                }
            }
            .instrument(span),
        )
    }
}

fn record_complete(
    sink: &SharedSink,
    operation: &str,
    started: Instant,
    bytes: u64,
    error: Option<&str>,
) {
    sink.histogram(
        names::RESPONSE_BODY_SIZE,
        &[("operation", operation)],
        bytes as f64,
    );
    sink.histogram(
        names::REQUEST_DURATION,
        &[
            ("operation", operation),
            ("outcome", if error.is_some() { "error" } else { "ok" }),
        ],
        started.elapsed().as_secs_f64(),
    );
    match error {
        Some(error) => tracing::debug!(bytes, error, "response body ended with error"),
        None => tracing::trace!(bytes, "response body complete"),
    }
}
