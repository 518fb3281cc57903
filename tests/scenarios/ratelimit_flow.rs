//! Rate limiting scenarios through the full client pipeline.

use granite_client::Client;
use granite_core::{Error, HttpRequest, HttpResponse};
use granite_ratelimit::{OperationLimiters, RateLimitConfig};
use http::StatusCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn counting_transport(calls: Arc<AtomicUsize>) -> granite_core::BoxTransport {
    granite_core::BoxTransport::new(tower::service_fn(move |_req: HttpRequest| {
        let calls = Arc::clone(&calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Error>(HttpResponse::new(StatusCode::OK))
        }
    }))
}

#[tokio::test]
async fn fail_fast_rejects_before_any_round_trip() {
    let calls = Arc::new(AtomicUsize::new(0));
    let client = Client::builder()
        .transport_boxed(counting_transport(Arc::clone(&calls)))
        .base_url("https://api.example.com")
        .rate_limit(RateLimitConfig::builder().rate(1.0).burst(2).fail_fast())
        .build()
        .unwrap();

    assert!(client.op("list").get("/x").await.is_ok());
    assert!(client.op("list").get("/x").await.is_ok());
    let result = client.op("list").get("/x").await;
    assert!(matches!(result, Err(Error::RateLimited)));
    // The rejected request never reached the transport.
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn wait_mode_delays_instead_of_failing() {
    let calls = Arc::new(AtomicUsize::new(0));
    let client = Client::builder()
        .transport_boxed(counting_transport(Arc::clone(&calls)))
        .base_url("https://api.example.com")
        .rate_limit(RateLimitConfig::builder().rate(20.0).burst(1))
        .build()
        .unwrap();

    let started = Instant::now();
    for _ in 0..3 {
        client.op("list").get("/x").await.unwrap();
    }
    // Two of the three requests waited ~50ms each for a token.
    assert!(started.elapsed() >= Duration::from_millis(80));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn rate_limit_wait_respects_the_deadline() {
    let calls = Arc::new(AtomicUsize::new(0));
    let client = Client::builder()
        .transport_boxed(counting_transport(Arc::clone(&calls)))
        .base_url("https://api.example.com")
        .rate_limit(RateLimitConfig::builder().rate(0.1).burst(1))
        .build()
        .unwrap();

    client.op("list").get("/x").await.unwrap();

    // The next token is ~10s away; the deadline fires first.
    let result = client
        .op("list")
        .timeout(Duration::from_millis(50))
        .get("/x")
        .await;
    assert!(matches!(result, Err(Error::DeadlineExceeded)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn per_operation_limits_are_isolated() {
    let calls = Arc::new(AtomicUsize::new(0));
    let client = Client::builder()
        .transport_boxed(counting_transport(Arc::clone(&calls)))
        .base_url("https://api.example.com")
        .rate_limit(
            RateLimitConfig::builder()
                .fail_fast()
                .registry(Arc::new(OperationLimiters::new())),
        )
        .build()
        .unwrap();

    // Operation "a" exhausts its own bucket.
    assert!(client.op("a").rate_limit(1.0).get("/x").await.is_ok());
    assert!(matches!(
        client.op("a").rate_limit(1.0).get("/x").await,
        Err(Error::RateLimited)
    ));

    // Operation "b" is unaffected.
    assert!(client.op("b").rate_limit(1.0).get("/x").await.is_ok());
    // And un-limited operations bypass per-operation buckets entirely.
    assert!(client.op("c").get("/x").await.is_ok());
}
