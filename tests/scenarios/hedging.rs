//! Hedging scenarios through the full client pipeline.

use granite_client::Client;
use granite_core::{Error, HttpRequest, HttpResponse};
use granite_hedge::{AdaptiveHedge, HedgeConfig, LatencyTracker};
use http::StatusCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn hedge_wins_over_slow_primary() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let transport = tower::service_fn(move |_req: HttpRequest| {
        let counter = Arc::clone(&counter);
        async move {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                // Slow primary.
                tokio::time::sleep(Duration::from_millis(200)).await;
            } else {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            Ok::<_, Error>(HttpResponse::with_body(StatusCode::OK, "fast"))
        }
    });

    let client = Client::builder()
        .transport(transport)
        .base_url("https://api.example.com")
        .build()
        .unwrap();

    let started = Instant::now();
    let response = client
        .op("tail_sensitive")
        .hedge(Duration::from_millis(30))
        .get("/reads")
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        started.elapsed() < Duration::from_millis(120),
        "caller should get the hedge's answer, not the primary's: {:?}",
        started.elapsed()
    );
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn hedged_attempt_count_is_bounded() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let transport = tower::service_fn(move |_req: HttpRequest| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<_, Error>(HttpResponse::new(StatusCode::OK))
        }
    });

    let client = Client::builder()
        .transport(transport)
        .base_url("https://api.example.com")
        .build()
        .unwrap();

    let _ = client
        .op("bounded")
        .hedge_config(
            HedgeConfig::builder()
                .delay(Duration::from_millis(5))
                .max_hedges(3)
                .build(),
        )
        .get("/reads")
        .await
        .unwrap();

    // Give any stray spawns a moment to land before counting.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(calls.load(Ordering::SeqCst) <= 4, "at most hedges + 1 attempts");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn adaptive_hedge_uses_tracked_percentile() {
    // A tracker trusting percentiles after 3 samples, pre-seeded with the
    // scenario's window.
    let tracker = Arc::new(LatencyTracker::new(100, 3));
    for ms in [10, 20, 30, 40, 50] {
        tracker.record("lookup", Duration::from_millis(ms));
    }

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let transport = tower::service_fn(move |_req: HttpRequest| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            // Slower than the p80 of 40ms: the hedge fires.
            tokio::time::sleep(Duration::from_millis(80)).await;
            Ok::<_, Error>(HttpResponse::new(StatusCode::OK))
        }
    });

    let client = Client::builder()
        .transport(transport)
        .base_url("https://api.example.com")
        .latency_tracker(Arc::clone(&tracker))
        .build()
        .unwrap();

    let response = client
        .op("lookup")
        .adaptive_hedge(AdaptiveHedge {
            percentile: 0.8,
            min_samples: 3,
            fallback_delay: Duration::from_millis(100),
        })
        .get("/lookup")
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    // The 40ms adaptive delay elapsed before the 80ms primary finished, so
    // a hedge was dispatched.
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn live_calls_feed_the_latency_window() {
    let tracker = Arc::new(LatencyTracker::new(100, 3));
    let transport = tower::service_fn(|_req: HttpRequest| async {
        Ok::<_, Error>(HttpResponse::new(StatusCode::OK))
    });

    let client = Client::builder()
        .transport(transport)
        .base_url("https://api.example.com")
        .latency_tracker(Arc::clone(&tracker))
        .build()
        .unwrap();

    for _ in 0..5 {
        let _ = client.op("warm").get("/x").await.unwrap();
    }
    assert_eq!(tracker.sample_count("warm"), 5);
}
