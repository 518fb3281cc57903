//! Tower layer for the circuit breaker.

use crate::config::{BreakerConfig, BreakerConfigBuilder};
use crate::registry::BreakerRegistry;
use crate::Breaker;
use std::sync::Arc;
use tower_layer::Layer;

/// A Tower [`Layer`] that applies circuit breaking per operation name.
///
/// The layer owns the breaker registry, so every service produced from one
/// layer shares the same breakers. Build with [`BreakerConfig::builder`].
#[derive(Clone)]
pub struct BreakerLayer {
    registry: Arc<BreakerRegistry>,
}

impl BreakerLayer {
    pub(crate) fn new(config: BreakerConfig) -> Self {
        Self {
            registry: Arc::new(BreakerRegistry::new(config)),
        }
    }

    pub fn builder() -> BreakerConfigBuilder {
        BreakerConfig::builder()
    }

    /// The shared registry, for state inspection.
    pub fn registry(&self) -> Arc<BreakerRegistry> {
        Arc::clone(&self.registry)
    }
}

impl<S> Layer<S> for BreakerLayer {
    type Service = Breaker<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Breaker::new(inner, Arc::clone(&self.registry))
    }
}
