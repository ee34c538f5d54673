//! Configuration options for the bus and its listeners.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::event::Event;

/// Listener-level predicate; returning false skips the listener for that
/// event without counting a failure.
pub type ListenerFilter = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

/// Options controlling bus behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusOptions {
    /// Queue bound; the oldest queued event is evicted past this size.
    pub max_queue_size: usize,
    /// Number of delivery reports kept in the history ring.
    pub max_history: usize,
    /// Source stamped on events that do not name one.
    pub default_source: String,
    /// Drain the queue on the publishing call when no drain is in flight.
    ///
    /// When disabled, queued events wait for an explicit
    /// [`crate::EventBus::drain`].
    pub auto_drain: bool,
}

impl Default for BusOptions {
    fn default() -> Self {
        Self {
            max_queue_size: 1000,
            max_history: 500,
            default_source: "event-bus".to_string(),
            auto_drain: true,
        }
    }
}

impl BusOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_max_queue_size(mut self, size: usize) -> Self {
        self.max_queue_size = size;
        self
    }

    #[must_use]
    pub fn with_max_history(mut self, size: usize) -> Self {
        self.max_history = size;
        self
    }

    #[must_use]
    pub fn with_default_source(mut self, source: impl Into<String>) -> Self {
        self.default_source = source.into();
        self
    }

    #[must_use]
    pub fn with_auto_drain(mut self, enable: bool) -> Self {
        self.auto_drain = enable;
        self
    }
}

/// Per-listener registration options.
#[derive(Clone, Default)]
pub struct SubscribeOptions {
    /// Unregister after the first invocation (successful or not).
    pub once: bool,
    /// Higher priorities are invoked first; ties keep registration order.
    pub priority: i32,
    /// Free-form label carried into delivery reports and logs.
    pub context: Option<String>,
    pub filter: Option<ListenerFilter>,
}

impl SubscribeOptions {
    #[must_use]
    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }

    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    #[must_use]
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }
}

impl fmt::Debug for SubscribeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscribeOptions")
            .field("once", &self.once)
            .field("priority", &self.priority)
            .field("context", &self.context)
            .field("filter", &self.filter.is_some())
            .finish()
    }
}
