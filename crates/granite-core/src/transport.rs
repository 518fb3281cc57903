//! Transport boxing for chain assembly.
//!
//! The base transport is an injected dependency: any Tower service over the
//! concrete wire types. [`BoxTransport`] erases its type so the client can
//! stack policy layers one by one and store the finished chain in a plain
//! field. The wrapper clones the underlying service per call, so a boxed
//! transport is freely shared across concurrent requests.
//!
//! The base transport owns connections and connection pooling; proxy
//! environment variables (`HTTP_PROXY`, `HTTPS_PROXY`, `NO_PROXY`) are its
//! concern when proxy-from-environment is enabled on it.

use crate::{Error, HttpRequest, HttpResponse};
use futures::future::BoxFuture;
use std::task::{Context, Poll};
use tower::ServiceExt;
use tower_service::Service;

trait CloneTransport: Send + Sync {
    fn call_boxed(&self, request: HttpRequest) -> BoxFuture<'static, Result<HttpResponse, Error>>;
    fn clone_boxed(&self) -> Box<dyn CloneTransport>;
}

impl<S> CloneTransport for S
where
    S: Service<HttpRequest, Response = HttpResponse, Error = Error>
        + Clone
        + Send
        + Sync
        + 'static,
    S::Future: Send + 'static,
{
    fn call_boxed(&self, request: HttpRequest) -> BoxFuture<'static, Result<HttpResponse, Error>> {
        Box::pin(self.clone().oneshot(request))
    }

    fn clone_boxed(&self) -> Box<dyn CloneTransport> {
        Box::new(self.clone())
    }
}

/// A type-erased, clonable, thread-safe transport.
pub struct BoxTransport {
    inner: Box<dyn CloneTransport>,
}

impl BoxTransport {
    pub fn new<S>(service: S) -> Self
    where
        S: Service<HttpRequest, Response = HttpResponse, Error = Error>
            + Clone
            + Send
            + Sync
            + 'static,
        S::Future: Send + 'static,
    {
        Self {
            inner: Box::new(service),
        }
    }

    /// Dispatches one round trip.
    pub fn round_trip(&self, request: HttpRequest) -> BoxFuture<'static, Result<HttpResponse, Error>> {
        self.inner.call_boxed(request)
    }
}

impl Clone for BoxTransport {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone_boxed(),
        }
    }
}

impl std::fmt::Debug for BoxTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BoxTransport")
    }
}

impl Service<HttpRequest> for BoxTransport {
    type Response = HttpResponse;
    type Error = Error;
    type Future = BoxFuture<'static, Result<HttpResponse, Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Readiness is resolved per call through `oneshot`.
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: HttpRequest) -> Self::Future {
        self.inner.call_boxed(request)
    }
}
