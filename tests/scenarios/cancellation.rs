//! Deadline and cancellation scenarios.

use granite_breaker::BreakerConfig;
use granite_client::Client;
use granite_core::{Error, HttpRequest, HttpResponse};
use granite_retry::{ConstantBackoff, RetryConfig};
use http::StatusCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn sleepy_transport(calls: Arc<AtomicUsize>, latency: Duration) -> granite_core::BoxTransport {
    granite_core::BoxTransport::new(tower::service_fn(move |_req: HttpRequest| {
        let calls = Arc::clone(&calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(latency).await;
            Ok::<_, Error>(HttpResponse::new(StatusCode::OK))
        }
    }))
}

#[tokio::test]
async fn deadline_cancels_without_scheduling_retries() {
    let calls = Arc::new(AtomicUsize::new(0));
    let client = Client::builder()
        .transport_boxed(sleepy_transport(Arc::clone(&calls), Duration::from_secs(5)))
        .base_url("https://api.example.com")
        .retry(
            RetryConfig::builder()
                .max_retries(5)
                .backoff(ConstantBackoff::new(Duration::from_millis(1))),
        )
        .breaker(BreakerConfig::builder().failure_threshold(5))
        .build()
        .unwrap();

    let started = Instant::now();
    let result = client
        .op("slow")
        .timeout(Duration::from_millis(50))
        .get("/slow")
        .await;

    assert!(matches!(result, Err(Error::DeadlineExceeded)));
    assert!(
        started.elapsed() < Duration::from_millis(200),
        "deadline should fire promptly: {:?}",
        started.elapsed()
    );
    // One attempt went out; no retry was scheduled after cancellation.
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // The abandoned attempt never settled, so breaker counters are
    // untouched.
    let breaker = client.breakers().unwrap().get("slow").unwrap();
    assert_eq!(breaker.counts().requests, 0);
}

#[tokio::test]
async fn builder_timeout_can_only_shorten_the_client_timeout() {
    let calls = Arc::new(AtomicUsize::new(0));
    let client = Client::builder()
        .transport_boxed(sleepy_transport(Arc::clone(&calls), Duration::from_secs(5)))
        .base_url("https://api.example.com")
        .timeout(Duration::from_millis(40))
        .build()
        .unwrap();

    let started = Instant::now();
    // The request asks for 10 seconds; the client cap wins.
    let result = client
        .op("slow")
        .timeout(Duration::from_secs(10))
        .get("/slow")
        .await;

    assert!(matches!(result, Err(Error::DeadlineExceeded)));
    assert!(started.elapsed() < Duration::from_millis(200));
}

#[tokio::test]
async fn fast_requests_are_untouched_by_the_deadline() {
    let calls = Arc::new(AtomicUsize::new(0));
    let client = Client::builder()
        .transport_boxed(sleepy_transport(Arc::clone(&calls), Duration::from_millis(5)))
        .base_url("https://api.example.com")
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap();

    let response = client.op("fast").get("/fast").await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
