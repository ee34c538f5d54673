//! Undo history entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::ComponentRecord;

/// Where a removed record sat inside its parent's `children`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentSlot {
    pub parent_id: String,
    pub index: usize,
}

/// A reversible change to the store.
///
/// Each variant carries enough of the before/after records to be applied in
/// either direction without consulting the current state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum HistoryEntry {
    #[serde(rename_all = "camelCase")]
    StateChange {
        id: String,
        previous: ComponentRecord,
        next: ComponentRecord,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    ComponentCreated {
        id: String,
        record: ComponentRecord,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    ComponentRemoved {
        id: String,
        record: ComponentRecord,
        parent_slot: Option<ParentSlot>,
        /// Records from the removed subtree, in parent-before-child order.
        descendants: Vec<ComponentRecord>,
        timestamp: DateTime<Utc>,
    },
    /// Several changes that undo and redo as one step.
    #[serde(rename_all = "camelCase")]
    Transaction {
        label: String,
        entries: Vec<HistoryEntry>,
        timestamp: DateTime<Utc>,
    },
}

impl HistoryEntry {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StateChange { .. } => "state-change",
            Self::ComponentCreated { .. } => "component-created",
            Self::ComponentRemoved { .. } => "component-removed",
            Self::Transaction { .. } => "transaction",
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::StateChange { timestamp, .. }
            | Self::ComponentCreated { timestamp, .. }
            | Self::ComponentRemoved { timestamp, .. }
            | Self::Transaction { timestamp, .. } => *timestamp,
        }
    }

    /// Short human-readable label for listings.
    pub fn label(&self) -> String {
        match self {
            Self::StateChange { id, .. } => format!("change {id}"),
            Self::ComponentCreated { id, .. } => format!("create {id}"),
            Self::ComponentRemoved {
                id, descendants, ..
            } => {
                if descendants.is_empty() {
                    format!("remove {id}")
                } else {
                    format!("remove {id} (+{} nested)", descendants.len())
                }
            }
            Self::Transaction { label, .. } => label.clone(),
        }
    }

    /// Component ids touched by this entry.
    pub fn component_ids(&self) -> Vec<&str> {
        match self {
            Self::StateChange { id, .. } | Self::ComponentCreated { id, .. } => vec![id.as_str()],
            Self::ComponentRemoved {
                id,
                parent_slot,
                descendants,
                ..
            } => {
                let mut ids = vec![id.as_str()];
                if let Some(slot) = parent_slot {
                    ids.push(slot.parent_id.as_str());
                }
                ids.extend(descendants.iter().map(|record| record.id.as_str()));
                ids
            }
            Self::Transaction { entries, .. } => {
                entries.iter().flat_map(HistoryEntry::component_ids).collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ComponentInit;
    use serde_json::json;

    #[test]
    fn entries_serialize_with_kind_tag() {
        let record = ComponentInit::new("layout", "Section")
            .with_id("a")
            .into_record(Utc::now());
        let entry = HistoryEntry::ComponentCreated {
            id: "a".to_string(),
            record,
            timestamp: Utc::now(),
        };
        let value = serde_json::to_value(&entry).expect("serialize entry");
        assert_eq!(value["kind"], json!("component-created"));
        let round: HistoryEntry = serde_json::from_value(value).expect("deserialize entry");
        assert_eq!(round, entry);
    }

    #[test]
    fn transaction_collects_component_ids() {
        let now = Utc::now();
        let a = ComponentInit::new("layout", "Section").with_id("a").into_record(now);
        let b = ComponentInit::new("basic", "Text").with_id("b").into_record(now);
        let entry = HistoryEntry::Transaction {
            label: "add b to a".to_string(),
            entries: vec![
                HistoryEntry::StateChange {
                    id: "a".to_string(),
                    previous: a.clone(),
                    next: a,
                    timestamp: now,
                },
                HistoryEntry::StateChange {
                    id: "b".to_string(),
                    previous: b.clone(),
                    next: b,
                    timestamp: now,
                },
            ],
            timestamp: now,
        };
        assert_eq!(entry.component_ids(), vec!["a", "b"]);
        assert_eq!(entry.label(), "add b to a");
        assert_eq!(entry.kind(), "transaction");
    }
}
