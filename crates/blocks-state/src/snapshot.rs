//! Export and import of the whole store.

use std::collections::HashMap;

use blocks_model::{ModelError, StateSnapshot};
use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::{Result, StateError};
use crate::events;
use crate::history::History;
use crate::store::StateStore;

impl StateStore {
    /// Serializable copy of every record plus the history and its cursor.
    pub fn export_state(&self) -> StateSnapshot {
        StateSnapshot {
            states: self
                .records()
                .into_iter()
                .map(|record| (record.id.clone(), record.clone()))
                .collect(),
            history: self.history().cloned().collect(),
            history_index: self.history_index(),
            exported: Utc::now(),
        }
    }

    /// Replace records, history, cursor and subscribers with `snapshot`.
    ///
    /// Metadata is recomputed for every record; any open batch bookkeeping is
    /// discarded.
    ///
    /// # Errors
    ///
    /// [`StateError::InvalidSnapshot`] when a key disagrees with its record,
    /// an id appears twice or `historyIndex` is out of range. The store is
    /// unchanged in that case.
    pub fn import_state(&mut self, snapshot: StateSnapshot) -> Result<()> {
        snapshot.check_shape().map_err(|error| match error {
            ModelError::InvalidSnapshot(message) => StateError::InvalidSnapshot(message),
            other => StateError::Model(other),
        })?;

        let applied = snapshot.applied_entries();
        let mut records = HashMap::with_capacity(snapshot.states.len());
        for (id, record) in snapshot.states {
            if records.insert(id.clone(), record).is_some() {
                warn!(component_id = %id, "Snapshot lists a component twice");
                return Err(StateError::InvalidSnapshot(format!(
                    "component '{id}' appears more than once"
                )));
            }
        }

        let count = records.len();
        self.records = records;
        self.history = History::from_parts(snapshot.history, applied, self.options.max_history);
        self.clear_subscribers();
        self.batch_touched.clear();
        self.refresh_all();

        let integrity = self.check_integrity();
        if integrity.has_errors() {
            warn!(errors = integrity.error_count(), "Imported state has integrity errors: {integrity}");
        } else {
            debug!(warnings = integrity.warning_count(), "Imported state is consistent");
        }
        info!(components = count, history = self.history.len(), "State imported");
        self.emit(
            events::STATE_IMPORTED,
            json!({
                "componentCount": count,
                "historyIndex": self.history_index(),
                "exported": snapshot.exported,
            }),
        );
        Ok(())
    }
}
