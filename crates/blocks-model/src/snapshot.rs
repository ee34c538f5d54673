//! Serialized form of a whole store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::history::HistoryEntry;
use crate::record::ComponentRecord;

/// Full snapshot of records and history.
///
/// `history_index` uses the wire convention: the index of the last applied
/// entry, or `-1` when nothing is applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub states: Vec<(String, ComponentRecord)>,
    pub history: Vec<HistoryEntry>,
    pub history_index: i64,
    pub exported: DateTime<Utc>,
}

impl StateSnapshot {
    pub fn from_json(text: &str) -> Result<Self> {
        let snapshot: Self = serde_json::from_str(text)?;
        snapshot.check_shape()?;
        Ok(snapshot)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Number of applied history entries (the cursor as a count).
    pub fn applied_entries(&self) -> usize {
        usize::try_from(self.history_index + 1).unwrap_or(0)
    }

    /// Reject snapshots whose keys disagree with their records or whose
    /// cursor points outside the history.
    pub fn check_shape(&self) -> Result<()> {
        for (key, record) in &self.states {
            if *key != record.id {
                return Err(ModelError::InvalidSnapshot(format!(
                    "state key '{key}' does not match record id '{}'",
                    record.id
                )));
            }
        }
        let len = i64::try_from(self.history.len()).unwrap_or(i64::MAX);
        if self.history_index < -1 || self.history_index >= len {
            return Err(ModelError::InvalidSnapshot(format!(
                "history index {} is outside -1..{len}",
                self.history_index
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ComponentInit;

    fn snapshot() -> StateSnapshot {
        let record = ComponentInit::new("layout", "Section")
            .with_id("a")
            .into_record(Utc::now());
        StateSnapshot {
            states: vec![("a".to_string(), record)],
            history: Vec::new(),
            history_index: -1,
            exported: Utc::now(),
        }
    }

    #[test]
    fn json_uses_wire_field_names() {
        let text = snapshot().to_json_pretty().expect("serialize snapshot");
        assert!(text.contains("\"historyIndex\": -1"));
        assert!(text.contains("\"states\""));
        let round = StateSnapshot::from_json(&text).expect("parse snapshot");
        assert_eq!(round.states.len(), 1);
        assert_eq!(round.applied_entries(), 0);
    }

    #[test]
    fn rejects_cursor_past_history() {
        let mut snap = snapshot();
        snap.history_index = 3;
        let err = snap.check_shape().unwrap_err();
        assert!(err.to_string().contains("history index 3"));
    }

    #[test]
    fn rejects_mismatched_keys() {
        let mut snap = snapshot();
        snap.states[0].0 = "b".to_string();
        assert!(snap.check_shape().is_err());
    }
}
