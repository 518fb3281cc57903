//! The token bucket.

use parking_lot::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// A token bucket: `rate` tokens per second with capacity `burst`.
///
/// Acquisition deducts a token immediately; when the bucket is in deficit,
/// [`RateLimiter::acquire`] sleeps until the reservation becomes valid.
/// Sleeps happen outside the bucket lock.
#[derive(Debug)]
pub struct RateLimiter {
    rate: f64,
    burst: f64,
    state: Mutex<Bucket>,
}

impl RateLimiter {
    /// Creates a limiter. A burst of zero is lifted to one so any positive
    /// rate still lets one request through at a time.
    pub fn new(rate: f64, burst: u32) -> Self {
        let burst = f64::from(burst.max(1));
        Self {
            rate: rate.max(f64::MIN_POSITIVE),
            burst,
            state: Mutex::new(Bucket {
                tokens: burst,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn burst(&self) -> u32 {
        self.burst as u32
    }

    fn refill(&self, bucket: &mut Bucket, now: Instant) {
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.burst);
        bucket.last_refill = now;
    }

    /// Takes one token if available right now.
    pub fn try_acquire(&self) -> bool {
        let mut bucket = self.state.lock();
        self.refill(&mut bucket, Instant::now());
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Reserves `n` tokens, returning the delay before the reservation
    /// becomes valid. `None` when the reservation can never be satisfied
    /// (`n` exceeds the burst capacity).
    pub fn reserve(&self, n: f64) -> Option<Duration> {
        if n > self.burst {
            return None;
        }
        let mut bucket = self.state.lock();
        self.refill(&mut bucket, Instant::now());
        bucket.tokens -= n;
        if bucket.tokens >= 0.0 {
            Some(Duration::ZERO)
        } else {
            Some(Duration::from_secs_f64(-bucket.tokens / self.rate))
        }
    }

    /// Takes one token, sleeping until it is available. Returns how long
    /// the caller waited.
    ///
    /// Cancellation composes by drop: the enclosing deadline aborts the
    /// sleep together with the request.
    pub async fn acquire(&self) -> Duration {
        match self.reserve(1.0) {
            Some(delay) if delay > Duration::ZERO => {
                tokio::time::sleep(delay).await;
                delay
            }
            _ => Duration::ZERO,
        }
    }
}
