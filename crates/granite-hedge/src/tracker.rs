//! Per-endpoint latency sampling.
//!
//! Each endpoint key owns a fixed-capacity ring of duration samples.
//! Percentiles are computed by copying the populated prefix and sorting the
//! snapshot, so reads never block writers for long and writers only take the
//! lock for a single slot store.

use hashbrown::HashMap;
use parking_lot::Mutex;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

#[derive(Debug)]
struct Ring {
    samples: Vec<Duration>,
    head: usize,
    count: usize,
}

impl Ring {
    fn new(capacity: usize) -> Self {
        Self {
            samples: vec![Duration::ZERO; capacity],
            head: 0,
            count: 0,
        }
    }

    fn push(&mut self, sample: Duration) {
        let capacity = self.samples.len();
        self.samples[self.head] = sample;
        self.head = (self.head + 1) % capacity;
        self.count = (self.count + 1).min(capacity);
    }

    fn snapshot(&self) -> Vec<Duration> {
        self.samples[..self.count].to_vec()
    }
}

/// Sliding-window latency samples keyed by endpoint.
#[derive(Debug)]
pub struct LatencyTracker {
    capacity: usize,
    min_samples: usize,
    rings: Mutex<HashMap<String, Ring>>,
}

impl Default for LatencyTracker {
    fn default() -> Self {
        Self::new(100, 10)
    }
}

impl LatencyTracker {
    /// A tracker holding up to `capacity` samples per endpoint and refusing
    /// to answer percentile queries below `min_samples`.
    pub fn new(capacity: usize, min_samples: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            min_samples: min_samples.max(1),
            rings: Mutex::new(HashMap::new()),
        }
    }

    pub fn min_samples(&self) -> usize {
        self.min_samples
    }

    /// Records one sample for an endpoint.
    pub fn record(&self, endpoint: &str, latency: Duration) {
        let mut rings = self.rings.lock();
        match rings.get_mut(endpoint) {
            Some(ring) => ring.push(latency),
            None => {
                let mut ring = Ring::new(self.capacity);
                ring.push(latency);
                rings.insert(endpoint.to_string(), ring);
            }
        }
    }

    /// Number of samples currently held for an endpoint.
    pub fn sample_count(&self, endpoint: &str) -> usize {
        self.rings.lock().get(endpoint).map_or(0, |ring| ring.count)
    }

    /// The `p`-th percentile (`0.0..=1.0`) of the endpoint's window, or
    /// `None` while fewer than `min_samples` samples exist.
    ///
    /// Returns `samples[⌊(n−1)·p⌋]` of the sorted snapshot.
    pub fn percentile(&self, endpoint: &str, p: f64) -> Option<Duration> {
        let mut snapshot = {
            let rings = self.rings.lock();
            let ring = rings.get(endpoint)?;
            if ring.count < self.min_samples {
                return None;
            }
            ring.snapshot()
        };
        snapshot.sort_unstable();

        let p = p.clamp(0.0, 1.0);
        let index = ((snapshot.len() - 1) as f64 * p).floor() as usize;
        Some(snapshot[index])
    }
}

/// The process-wide default tracker, for clients that do not inject one.
pub fn default_tracker() -> Arc<LatencyTracker> {
    static TRACKER: OnceLock<Arc<LatencyTracker>> = OnceLock::new();
    Arc::clone(TRACKER.get_or_init(|| Arc::new(LatencyTracker::default())))
}
