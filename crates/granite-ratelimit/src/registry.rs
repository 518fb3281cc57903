//! Per-operation limiter registry.
//!
//! Buckets are keyed by operation name; different operations never share a
//! bucket. A process-wide default registry exists for clients that do not
//! inject their own.

use crate::limiter::RateLimiter;
use hashbrown::HashMap;
use parking_lot::RwLock;
use std::sync::{Arc, OnceLock};

#[derive(Debug, Default)]
pub struct OperationLimiters {
    limiters: RwLock<HashMap<String, Arc<RateLimiter>>>,
}

impl OperationLimiters {
    pub fn new() -> Self {
        Self::default()
    }

    /// The bucket for an operation, created on first use.
    ///
    /// The first caller's `(rate, burst)` wins; later calls with different
    /// parameters reuse the existing bucket.
    pub fn get_or_create(&self, operation: &str, rate: f64, burst: u32) -> Arc<RateLimiter> {
        if let Some(limiter) = self.limiters.read().get(operation) {
            return Arc::clone(limiter);
        }

        let mut limiters = self.limiters.write();
        if let Some(limiter) = limiters.get(operation) {
            return Arc::clone(limiter);
        }
        let limiter = Arc::new(RateLimiter::new(rate, burst));
        limiters.insert(operation.to_string(), Arc::clone(&limiter));
        limiter
    }

    pub fn len(&self) -> usize {
        self.limiters.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.limiters.read().is_empty()
    }
}

/// The process-wide default registry.
pub fn default_registry() -> &'static OperationLimiters {
    static REGISTRY: OnceLock<OperationLimiters> = OnceLock::new();
    REGISTRY.get_or_init(OperationLimiters::new)
}
