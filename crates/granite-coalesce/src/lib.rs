//! In-flight request deduplication (single-flight) for the granite pipeline.
//!
//! When a request arrives whose fingerprint matches a call already in
//! flight, the arriving caller joins the existing call and receives a clone
//! of the same result. Coalescing is purely about *concurrent*
//! deduplication: the key is removed the moment the result is broadcast, so
//! sequential identical requests each execute. This is not a cache.
//!
//! The leader's work runs as a detached task. A caller that cancels — the
//! leader included — simply stops listening; the underlying call proceeds
//! and its result still reaches every surviving joiner.

mod key;

pub use key::fingerprint;

use hashbrown::HashMap;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;

/// The in-flight call disappeared without producing a result (its task
/// panicked). Joiners surface this instead of hanging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlightLost;

impl std::fmt::Display for FlightLost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("coalesced call completed without broadcasting a result")
    }
}

impl std::error::Error for FlightLost {}

/// A single-flight group keyed by request fingerprint.
///
/// `T` is the broadcast result type; it must be `Clone` because every
/// joiner receives its own copy.
pub struct SingleFlight<T> {
    inflight: Arc<Mutex<HashMap<String, broadcast::Sender<T>>>>,
}

impl<T> Default for SingleFlight<T>
where
    T: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of keys currently in flight.
    pub fn len(&self) -> usize {
        self.inflight.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inflight.lock().is_empty()
    }

    /// Runs `work` under `key`, or joins the call already in flight.
    ///
    /// Returns the result and whether this caller joined an existing flight
    /// (`true`) or led a new one (`false`).
    pub async fn run<F>(&self, key: String, work: F) -> Result<(T, bool), FlightLost>
    where
        F: Future<Output = T> + Send + 'static,
    {
        let (mut receiver, joined) = {
            let mut inflight = self.inflight.lock();
            if let Some(sender) = inflight.get(&key) {
                (sender.subscribe(), true)
            } else {
                let (sender, receiver) = broadcast::channel(1);
                inflight.insert(key.clone(), sender.clone());

                let registry = Arc::clone(&self.inflight);
                tokio::spawn(async move {
                    let value = work.await;
                    // Remove before sending: a caller arriving after the
                    // broadcast must lead its own flight, never coalesce
                    // with a completed one.
                    registry.lock().remove(&key);
                    let _ = sender.send(value);
                });

                (receiver, false)
            }
        };

        match receiver.recv().await {
            Ok(value) => Ok((value, joined)),
            Err(_) => {
                tracing::warn!("in-flight coalesced call vanished before broadcasting");
                Err(FlightLost)
            }
        }
    }
}

impl<T> std::fmt::Debug for SingleFlight<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleFlight")
            .field("inflight", &self.inflight.lock().len())
            .finish()
    }
}
