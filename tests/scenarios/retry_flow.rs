//! Retry scenarios through the full client pipeline.

use super::test_utils::CaptureSink;
use granite_client::Client;
use granite_core::metrics::names;
use granite_core::{Error, HttpRequest, HttpResponse};
use granite_retry::{ConstantBackoff, RetryConfig};
use http::StatusCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn retry_then_succeed_makes_three_round_trips() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let transport = tower::service_fn(move |_req: HttpRequest| {
        let counter = Arc::clone(&counter);
        async move {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Ok::<_, Error>(HttpResponse::new(StatusCode::SERVICE_UNAVAILABLE))
            } else {
                Ok(HttpResponse::with_body(StatusCode::OK, "ok"))
            }
        }
    });

    let (capture, sink) = CaptureSink::shared();
    let client = Client::builder()
        .transport(transport)
        .base_url("https://api.example.com")
        .retry(
            RetryConfig::builder()
                .max_retries(3)
                .backoff(ConstantBackoff::new(Duration::from_millis(1))),
        )
        .metrics(sink)
        .build()
        .unwrap();

    let response = client.op("flaky").get("/things").await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(capture.counter_total(names::RETRY_ATTEMPTS), 2);
    assert_eq!(capture.counter_total(names::RETRY_EXHAUSTED), 0);
}

#[tokio::test]
async fn exhausted_retries_record_and_return_last_response() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let transport = tower::service_fn(move |_req: HttpRequest| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Error>(HttpResponse::new(StatusCode::BAD_GATEWAY))
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
        .metrics(sink)
        .build()
        .unwrap();

    let response = client.op("down").get("/things").await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(capture.counter_total(names::RETRY_EXHAUSTED), 1);
}

#[tokio::test]
async fn non_retryable_500_returns_body_intact() {
    let transport = tower::service_fn(|_req: HttpRequest| async {
        Ok::<_, Error>(HttpResponse::with_body(
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"message":"stack trace"}"#,
        ))
    });

    let client = Client::builder()
        .transport(transport)
        .base_url("https://api.example.com")
        .retry(RetryConfig::builder().max_retries(5))
        .build()
        .unwrap();

    let response = client.op("bug").get("/things").await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    // The body survives for caller inspection.
    let text = response.text().await.unwrap();
    assert!(text.contains("stack trace"));
}

#[tokio::test]
async fn single_shot_body_is_buffered_and_replayed() {
    let bodies: Arc<std::sync::Mutex<Vec<Vec<u8>>>> = Arc::new(std::sync::Mutex::new(Vec::new()));
    let seen = Arc::clone(&bodies);
    let transport = tower::service_fn(move |req: HttpRequest| {
        let seen = Arc::clone(&seen);
        async move {
            let mut collected = Vec::new();
            if let Some(mut stream) = req.body.stream().unwrap() {
                while let Some(chunk) = futures::StreamExt::next(&mut stream).await {
                    collected.extend_from_slice(&chunk.unwrap());
                }
            }
            let attempts = {
                let mut guard = seen.lock().unwrap();
                guard.push(collected);
                guard.len()
            };
            if attempts < 3 {
                Ok::<_, Error>(HttpResponse::new(StatusCode::SERVICE_UNAVAILABLE))
            } else {
                Ok(HttpResponse::new(StatusCode::OK))
            }
        }
    });

    let client = Client::builder()
        .transport(transport)
        .base_url("https://api.example.com")
        .retry(
            RetryConfig::builder()
                .max_retries(3)
                .backoff(ConstantBackoff::new(Duration::from_millis(1))),
        )
        .build()
        .unwrap();

    let stream = futures::StreamExt::boxed(futures::stream::iter(vec![
        Ok(bytes::Bytes::from_static(b"part1-")),
        Ok(bytes::Bytes::from_static(b"part2")),
    ]));

    let response = client
        .op("upload")
        .body_stream(stream)
        .post("/ingest")
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bodies = bodies.lock().unwrap();
    assert_eq!(bodies.len(), 3);
    assert!(bodies.iter().all(|b| b == b"part1-part2"));
}
