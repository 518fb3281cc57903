//! Chaos composition: injected faults are observed by every attempt and
//! classified as transient.

use super::test_utils::CaptureSink;
use granite_chaos::ChaosConfig;
use granite_client::Client;
use granite_core::metrics::names;
use granite_core::{Error, HttpRequest, HttpResponse};
use granite_retry::{ConstantBackoff, RetryConfig};
use http::StatusCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn injected_errors_are_retried_as_transient_faults() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let transport = tower::service_fn(move |_req: HttpRequest| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Error>(HttpResponse::new(StatusCode::OK))
        }
    });

    let (capture, sink) = CaptureSink::shared();
    let client = Client::builder()
        .transport(transport)
        .base_url("https://api.example.com")
        .retry(
            RetryConfig::builder()
                .max_retries(2)
                .backoff(ConstantBackoff::new(Duration::from_millis(1))),
        )
        .chaos(ChaosConfig::builder().error_rate(1.0).seed(3))
        .metrics(sink)
        .build()
        .unwrap();

    // Chaos sits below retry, so every attempt observes the injected
    // fault; with a 100% error rate the request ultimately fails.
    let result = client.op("chaotic").get("/x").await;
    assert!(matches!(result, Err(Error::ChaosInjected)));

    // Three attempts, all absorbed by chaos before the wire.
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(capture.counter_total(names::RETRY_ATTEMPTS), 2);
    assert_eq!(capture.counter_total(names::CHAOS_INJECTED), 3);
}

#[tokio::test]
async fn injected_latency_still_forwards_to_the_transport() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let transport = tower::service_fn(move |_req: HttpRequest| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Error>(HttpResponse::new(StatusCode::OK))
        }
    });

    let client = Client::builder()
        .transport(transport)
        .base_url("https://api.example.com")
        .chaos(ChaosConfig::builder().latency(Duration::from_millis(20)))
        .build()
        .unwrap();

    let started = std::time::Instant::now();
    let response = client.op("slowed").get("/x").await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(started.elapsed() >= Duration::from_millis(20));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
