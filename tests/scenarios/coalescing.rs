//! Coalescing scenarios through the full client pipeline.

use granite_client::Client;
use granite_core::{Error, HttpRequest, HttpResponse};
use http::StatusCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn slow_counting_transport(
    calls: Arc<AtomicUsize>,
) -> impl tower::Service<
    HttpRequest,
    Response = HttpResponse,
    Error = Error,
    Future = futures::future::BoxFuture<'static, Result<HttpResponse, Error>>,
> + Clone
       + Send
       + Sync
       + 'static {
    tower::service_fn(move |_req: HttpRequest| {
        let calls = Arc::clone(&calls);
        let fut: futures::future::BoxFuture<'static, Result<HttpResponse, Error>> =
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(HttpResponse::with_body(StatusCode::OK, r#"{"id":1}"#))
            });
        fut
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn ten_concurrent_identical_requests_share_one_round_trip() {
    let calls = Arc::new(AtomicUsize::new(0));
    let client = Client::builder()
        .transport(slow_counting_transport(Arc::clone(&calls)))
        .base_url("https://api.example.com")
        .build()
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..10 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            client.op("get_user").coalesce().get("/users/1").await
        }));
    }

    for handle in handles {
        let envelope = handle.await.unwrap().unwrap();
        assert_eq!(envelope.status(), StatusCode::OK);
        assert_eq!(envelope.body().await.unwrap().as_ref(), br#"{"id":1}"#);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn different_query_values_do_not_coalesce() {
    let calls = Arc::new(AtomicUsize::new(0));
    let client = Client::builder()
        .transport(slow_counting_transport(Arc::clone(&calls)))
        .base_url("https://api.example.com")
        .build()
        .unwrap();

    let a = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .op("search")
                .coalesce()
                .query("page", "1")
                .get("/users")
                .await
        })
    };
    let b = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .op("search")
                .coalesce()
                .query("page", "2")
                .get("/users")
                .await
        })
    };

    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn sequential_identical_requests_each_execute() {
    let calls = Arc::new(AtomicUsize::new(0));
    let client = Client::builder()
        .transport(slow_counting_transport(Arc::clone(&calls)))
        .base_url("https://api.example.com")
        .build()
        .unwrap();

    for _ in 0..3 {
        let envelope = client.op("get_user").coalesce().get("/users/1").await.unwrap();
        assert_eq!(envelope.status(), StatusCode::OK);
    }
    // Coalescing deduplicates in-flight requests only; it is not a cache.
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn query_order_does_not_defeat_coalescing() {
    let calls = Arc::new(AtomicUsize::new(0));
    let client = Client::builder()
        .transport(slow_counting_transport(Arc::clone(&calls)))
        .base_url("https://api.example.com")
        .build()
        .unwrap();

    let a = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .op("search")
                .coalesce()
                .query("a", "1")
                .query("b", "2")
                .get("/users")
                .await
        })
    };
    let b = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .op("search")
                .coalesce()
                .query("b", "2")
                .query("a", "1")
                .get("/users")
                .await
        })
    };

    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
