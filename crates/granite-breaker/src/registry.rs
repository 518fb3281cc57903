//! Per-operation breaker registry.
//!
//! Exactly one breaker instance exists per operation name per client. The
//! registry lives as long as the client; lookups are read-locked on the hot
//! path with double-checked creation for new operations.

use crate::circuit::CircuitBreaker;
use crate::config::BreakerConfig;
use hashbrown::HashMap;
use parking_lot::RwLock;
use std::sync::Arc;

pub struct BreakerRegistry {
    config: Arc<BreakerConfig>,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config: Arc::new(config),
            breakers: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) fn config(&self) -> &Arc<BreakerConfig> {
        &self.config
    }

    pub fn get_or_create(&self, operation: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.read().get(operation) {
            return Arc::clone(breaker);
        }

        let mut breakers = self.breakers.write();
        // Another writer may have created it between the locks.
        if let Some(breaker) = breakers.get(operation) {
            return Arc::clone(breaker);
        }
        let breaker = Arc::new(CircuitBreaker::new(
            operation.to_string(),
            Arc::clone(&self.config),
        ));
        breakers.insert(operation.to_string(), Arc::clone(&breaker));
        breaker
    }

    /// The breaker for an operation, if one has been created.
    pub fn get(&self, operation: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.read().get(operation).cloned()
    }

    pub fn len(&self) -> usize {
        self.breakers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.read().is_empty()
    }
}

impl std::fmt::Debug for BreakerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreakerRegistry")
            .field("breakers", &self.len())
            .finish()
    }
}
