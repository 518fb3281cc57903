//! Circuit breaker scenarios through the full client pipeline.

use granite_breaker::{BreakerConfig, CircuitState};
use granite_client::Client;
use granite_core::{Error, HttpRequest, HttpResponse};
use http::StatusCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn breaker_trips_after_five_consecutive_failures() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let transport = tower::service_fn(move |_req: HttpRequest| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<HttpResponse, _>(Error::transport(std::io::Error::other("conn refused")))
        }
    });

    let client = Client::builder()
        .transport(transport)
        .base_url("https://api.example.com")
        .breaker(BreakerConfig::builder().failure_threshold(5))
        .build()
        .unwrap();

    for _ in 0..5 {
        let result = client.op("unstable").get("/x").await;
        assert!(matches!(result, Err(Error::Transport { .. })));
    }

    // The sixth call is rejected without touching the wire.
    let result = client.op("unstable").get("/x").await;
    assert!(matches!(result, Err(Error::CircuitOpen { operation }) if operation == "unstable"));
    assert_eq!(calls.load(Ordering::SeqCst), 5);

    let breaker = client.breakers().unwrap().get("unstable").unwrap();
    assert_eq!(breaker.state(), CircuitState::Open);
}

#[tokio::test]
async fn breaker_recovers_after_open_timeout() {
    let healthy = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let flag = Arc::clone(&healthy);
    let transport = tower::service_fn(move |_req: HttpRequest| {
        let flag = Arc::clone(&flag);
        async move {
            if flag.load(Ordering::SeqCst) {
                Ok(HttpResponse::new(StatusCode::OK))
            } else {
                Err::<HttpResponse, _>(Error::transport(std::io::Error::other("down")))
            }
        }
    });

    let client = Client::builder()
        .transport(transport)
        .base_url("https://api.example.com")
        .breaker(
            BreakerConfig::builder()
                .failure_threshold(2)
                .open_timeout(Duration::from_millis(40)),
        )
        .build()
        .unwrap();

    for _ in 0..2 {
        let _ = client.op("recovering").get("/x").await;
    }
    assert!(matches!(
        client.op("recovering").get("/x").await,
        Err(Error::CircuitOpen { .. })
    ));

    healthy.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(60)).await;

    let response = client.op("recovering").get("/x").await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let breaker = client.breakers().unwrap().get("recovering").unwrap();
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test]
async fn breaker_and_retry_compose() {
    // Retry is inside the breaker in the chain: one logical call that
    // retries N times reports a single outcome to the breaker.
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let transport = tower::service_fn(move |_req: HttpRequest| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Error>(HttpResponse::new(StatusCode::SERVICE_UNAVAILABLE))
        }
    });

    let client = Client::builder()
        .transport(transport)
        .base_url("https://api.example.com")
        .retry(
            granite_retry::RetryConfig::builder()
                .max_retries(2)
                .backoff(granite_retry::ConstantBackoff::new(Duration::from_millis(1))),
        )
        .breaker(BreakerConfig::builder().failure_threshold(2))
        .build()
        .unwrap();

    // Two logical calls, each 3 physical attempts ending in 503.
    for _ in 0..2 {
        let response = client.op("api").get("/x").await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 6);

    // Two breaker failures recorded: the circuit is open now.
    assert!(matches!(
        client.op("api").get("/x").await,
        Err(Error::CircuitOpen { .. })
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 6);
}
