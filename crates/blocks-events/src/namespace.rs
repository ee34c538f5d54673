//! Prefix-scoped view over a bus.

use crate::bus::{EventBus, Subscription};
use crate::error::Result;
use crate::event::{Event, EventDraft};
use crate::options::SubscribeOptions;

/// A view of an [`EventBus`] whose event types are implicitly prefixed with
/// `"<prefix>:"`. Dispatch is shared with the underlying bus.
#[derive(Debug, Clone)]
pub struct NamespacedBus {
    bus: EventBus,
    prefix: String,
}

impl EventBus {
    /// Scope this bus under `prefix`.
    pub fn namespace(&self, prefix: impl Into<String>) -> NamespacedBus {
        NamespacedBus {
            bus: self.clone(),
            prefix: prefix.into(),
        }
    }
}

impl NamespacedBus {
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Fully qualified event type. Empty types stay empty so that they are
    /// still rejected by the bus.
    pub fn qualify(&self, event_type: &str) -> String {
        if event_type.trim().is_empty() {
            String::new()
        } else {
            format!("{}:{}", self.prefix, event_type)
        }
    }

    /// # Errors
    ///
    /// Returns an error if `event_type` is empty.
    pub fn on<F>(&self, event_type: &str, handler: F) -> Result<Subscription>
    where
        F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_with(event_type, handler, SubscribeOptions::default())
    }

    /// # Errors
    ///
    /// Returns an error if `event_type` is empty.
    pub fn on_with<F>(
        &self,
        event_type: &str,
        handler: F,
        options: SubscribeOptions,
    ) -> Result<Subscription>
    where
        F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.bus.subscribe(self.qualify(event_type), handler, options)
    }

    /// # Errors
    ///
    /// Returns an error if `event_type` is empty.
    pub fn once<F>(&self, event_type: &str, handler: F) -> Result<Subscription>
    where
        F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.bus.once(self.qualify(event_type), handler)
    }

    pub fn off(&self, event_type: &str, listener_id: u64) -> bool {
        self.bus.unsubscribe(&self.qualify(event_type), listener_id)
    }

    /// Publish with the prefix applied to the draft's type.
    ///
    /// # Errors
    ///
    /// Returns an error if the draft has no type.
    pub fn emit(&self, draft: impl Into<EventDraft>) -> Result<bool> {
        let mut draft = draft.into();
        draft.event_type = self.qualify(&draft.event_type);
        self.bus.publish(draft)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn namespace_prefixes_all_operations() {
        let bus = EventBus::new();
        let palette = bus.namespace("palette");
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let sub = palette
            .on("select", move |event| {
                sink.lock().unwrap().push(event.event_type.clone());
                Ok(())
            })
            .unwrap();
        assert_eq!(sub.event_type(), "palette:select");

        palette.emit("select").unwrap();
        bus.publish("select").unwrap();
        bus.publish("palette:select").unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["palette:select".to_string(), "palette:select".to_string()]
        );

        assert!(palette.off("select", sub.id()));
        assert_eq!(bus.listener_count("palette:select"), 0);
    }

    #[test]
    fn namespace_keeps_empty_type_invalid() {
        let bus = EventBus::new();
        let scoped = bus.namespace("menu");
        assert!(scoped.emit("").is_err());
        assert!(scoped.on(" ", |_| Ok(())).is_err());
    }
}
