//! Event wire type and the draft used to publish one.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{BusError, Result};

/// A delivered event.
///
/// Serializes to the flat wire shape
/// `{ type, id, timestamp, source, propagate, ...payload }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: String,
    pub id: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub source: String,
    /// When false, dispatch stops after the first listener that succeeds.
    pub propagate: bool,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Event {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// An event before the bus has stamped it.
///
/// Anything left unset is filled in on publish: a fresh id, the current
/// timestamp, the bus's default source and `propagate = true`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventDraft {
    pub(crate) event_type: String,
    id: Option<String>,
    timestamp: Option<i64>,
    source: Option<String>,
    propagate: Option<bool>,
    payload: Map<String, Value>,
}

impl EventDraft {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            ..Self::default()
        }
    }

    /// Parse a wire-shaped JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::MissingEventType`] when `type` is absent or not a
    /// string, and [`BusError::InvalidArgument`] when the value is not an
    /// object.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut map) = value else {
            return Err(BusError::InvalidArgument(
                "event must be a JSON object".to_string(),
            ));
        };
        let event_type = match map.remove("type") {
            Some(Value::String(event_type)) => event_type,
            _ => return Err(BusError::MissingEventType),
        };
        let id = match map.remove("id") {
            Some(Value::String(id)) => Some(id),
            _ => None,
        };
        let timestamp = map.remove("timestamp").as_ref().and_then(Value::as_i64);
        let source = match map.remove("source") {
            Some(Value::String(source)) => Some(source),
            _ => None,
        };
        let propagate = map.remove("propagate").as_ref().and_then(Value::as_bool);
        Ok(Self {
            event_type,
            id,
            timestamp,
            source,
            propagate,
            payload: map,
        })
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_propagate(mut self, propagate: bool) -> Self {
        self.propagate = Some(propagate);
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }

    /// Merge every key of `payload` into the draft's payload.
    pub fn with_payload(mut self, payload: Map<String, Value>) -> Self {
        self.payload.extend(payload);
        self
    }

    pub(crate) fn normalize(self, default_source: &str) -> Result<Event> {
        if self.event_type.trim().is_empty() {
            return Err(BusError::MissingEventType);
        }
        Ok(Event {
            event_type: self.event_type,
            id: self
                .id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            timestamp: self
                .timestamp
                .unwrap_or_else(|| chrono::Utc::now().timestamp_millis()),
            source: self.source.unwrap_or_else(|| default_source.to_string()),
            propagate: self.propagate.unwrap_or(true),
            payload: self.payload,
        })
    }
}

impl From<&str> for EventDraft {
    fn from(event_type: &str) -> Self {
        Self::new(event_type)
    }
}

impl From<String> for EventDraft {
    fn from(event_type: String) -> Self {
        Self::new(event_type)
    }
}

/// Re-publishing a delivered event keeps its id, timestamp and source.
impl From<Event> for EventDraft {
    fn from(event: Event) -> Self {
        Self {
            event_type: event.event_type,
            id: Some(event.id),
            timestamp: Some(event.timestamp),
            source: Some(event.source),
            propagate: Some(event.propagate),
            payload: event.payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalize_fills_defaults() {
        let event = EventDraft::new("ping").normalize("bus").expect("normalize");
        assert_eq!(event.event_type, "ping");
        assert_eq!(event.source, "bus");
        assert!(event.propagate);
        assert!(!event.id.is_empty());
        assert!(event.timestamp > 0);
    }

    #[test]
    fn normalize_rejects_blank_type() {
        let err = EventDraft::new("  ").normalize("bus").unwrap_err();
        assert!(matches!(err, BusError::MissingEventType));
    }

    #[test]
    fn from_value_splits_envelope_and_payload() {
        let draft = EventDraft::from_value(json!({
            "type": "child:added",
            "source": "canvas",
            "parentId": "a",
            "childId": "b",
        }))
        .expect("parse draft");
        let event = draft.normalize("bus").expect("normalize");
        assert_eq!(event.source, "canvas");
        assert_eq!(event.get_str("parentId"), Some("a"));
        assert!(event.get("type").is_none());
    }

    #[test]
    fn from_value_requires_type() {
        let err = EventDraft::from_value(json!({ "source": "canvas" })).unwrap_err();
        assert!(matches!(err, BusError::MissingEventType));
        let err = EventDraft::from_value(json!("ping")).unwrap_err();
        assert!(matches!(err, BusError::InvalidArgument(_)));
    }

    #[test]
    fn event_serializes_flat() {
        let event = EventDraft::new("state:changed")
            .with_id("e1")
            .with_timestamp(42)
            .with_field("componentId", json!("a"))
            .normalize("store")
            .expect("normalize");
        assert_eq!(
            event.to_value(),
            json!({
                "type": "state:changed",
                "id": "e1",
                "timestamp": 42,
                "source": "store",
                "propagate": true,
                "componentId": "a",
            })
        );
    }
}
