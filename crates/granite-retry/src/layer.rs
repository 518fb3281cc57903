//! Tower layer for the retry engine.

use crate::config::RetryConfig;
use crate::Retry;
use std::sync::Arc;
use tower_layer::Layer;

/// A Tower [`Layer`] that applies retry behavior to an inner transport.
///
/// Assemble with [`RetryConfig::builder`]. When retrying is disabled
/// (`max_retries == 0`), skip installing the layer: the chain assembler in
/// `granite-client` elides it so the hot path pays nothing.
#[derive(Clone)]
pub struct RetryLayer {
    config: Arc<RetryConfig>,
}

impl RetryLayer {
    pub(crate) fn new(config: RetryConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Whether the configuration allows any retry at all.
    pub fn is_enabled(&self) -> bool {
        self.config.max_retries > 0
    }
}

impl<S> Layer<S> for RetryLayer {
    type Service = Retry<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Retry::new(inner, Arc::clone(&self.config))
    }
}
