//! Event system shared by every policy middleware.
//!
//! Each policy crate defines its own event enum (retry, breaker, hedge,
//! chaos, rate limit) and emits through an [`EventListeners`] collection
//! configured on its builder. Listeners are the extension point for custom
//! observability; the built-in metrics wiring is just another listener.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Trait for events emitted by policy middleware.
pub trait PolicyEvent: Send + Sync + fmt::Debug {
    /// The kind of event, e.g. `"retry"` or `"state_transition"`.
    fn event_type(&self) -> &'static str;

    /// When this event occurred.
    fn timestamp(&self) -> Instant;

    /// The configured name of the policy instance that emitted this event.
    fn pattern_name(&self) -> &str;
}

/// Trait for listening to policy events.
pub trait EventListener<E: PolicyEvent>: Send + Sync {
    fn on_event(&self, event: &E);
}

/// Type alias for shared event listeners.
pub type BoxedEventListener<E> = Arc<dyn EventListener<E>>;

/// A collection of event listeners.
#[derive(Clone)]
pub struct EventListeners<E: PolicyEvent> {
    listeners: Vec<BoxedEventListener<E>>,
}

impl<E: PolicyEvent> EventListeners<E> {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    pub fn add<L>(&mut self, listener: L)
    where
        L: EventListener<E> + 'static,
    {
        self.listeners.push(Arc::new(listener));
    }

    /// Emits an event to all registered listeners.
    ///
    /// A panicking listener is isolated: the panic is caught and the
    /// remaining listeners still run.
    pub fn emit(&self, event: &E) {
        for (index, listener) in self.listeners.iter().enumerate() {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener.on_event(event);
            }));

            if let Err(payload) = result {
                log_listener_panic(index, event, payload.as_ref());
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }
}

impl<E: PolicyEvent> Default for EventListeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

fn log_listener_panic<E: PolicyEvent>(index: usize, event: &E, payload: &(dyn Any + Send)) {
    let message = payload
        .downcast_ref::<&'static str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());

    tracing::warn!(
        listener_index = index,
        pattern = event.pattern_name(),
        event_type = event.event_type(),
        panic_message = %message,
        "policy event listener panicked"
    );
}

/// A simple function-based event listener.
pub struct FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    f: F,
    _phantom: std::marker::PhantomData<fn(&E)>,
}

impl<E, F> FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<E, F> EventListener<E> for FnListener<E, F>
where
    E: PolicyEvent,
    F: Fn(&E) + Send + Sync,
{
    fn on_event(&self, event: &E) {
        (self.f)(event)
    }
}
