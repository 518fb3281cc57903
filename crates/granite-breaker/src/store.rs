//! Shared counter storage for distributed breakers.
//!
//! Multiple clients can share one logical breaker per operation by pointing
//! their configurations at the same [`SharedStore`]. The contract is a
//! versioned last-writer-wins read-modify-write of counter snapshots; no
//! compare-and-swap is required of implementations. A Redis-backed
//! implementation lives outside the core, against this trait.

use crate::circuit::Counts;
use async_trait::async_trait;
use hashbrown::HashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A persisted counter window for one operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub counts: Counts,
    /// Monotonic write tag; last writer wins on equal-or-newer versions.
    pub version: u64,
}

/// Errors surfaced by a shared store.
///
/// Store errors never fail a request; the breaker logs them and degrades to
/// local counting.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("stored snapshot could not be decoded: {0}")]
    Corrupt(String),
}

/// Atomic read-modify-write of per-operation counter snapshots.
#[async_trait]
pub trait SharedStore: Send + Sync {
    async fn load(&self, operation: &str) -> Result<Option<BreakerSnapshot>, StoreError>;

    /// Persists a snapshot. Implementations apply last-writer-wins: the
    /// incoming snapshot replaces the stored one when its version is equal
    /// or newer.
    async fn save(&self, operation: &str, snapshot: BreakerSnapshot) -> Result<(), StoreError>;
}

/// Process-local reference implementation.
///
/// Useful for tests and for sharing a breaker across clients inside one
/// process.
#[derive(Debug, Default)]
pub struct InMemorySharedStore {
    entries: RwLock<HashMap<String, BreakerSnapshot>>,
}

impl InMemorySharedStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SharedStore for InMemorySharedStore {
    async fn load(&self, operation: &str) -> Result<Option<BreakerSnapshot>, StoreError> {
        Ok(self.entries.read().get(operation).copied())
    }

    async fn save(&self, operation: &str, snapshot: BreakerSnapshot) -> Result<(), StoreError> {
        let mut entries = self.entries.write();
        let entry = entries.entry(operation.to_string()).or_default();
        // Last writer wins; a newer stored version beats a stale writer.
        if snapshot.version >= entry.version {
            *entry = snapshot;
        }
        Ok(())
    }
}
