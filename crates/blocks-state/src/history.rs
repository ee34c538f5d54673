//! Undo/redo.
//!
//! The history is a bounded list of [`HistoryEntry`] values plus a cursor
//! counting how many of them are currently applied. Recording a new entry
//! discards everything after the cursor (the redo tail); exceeding the bound
//! drops the oldest entry.

use std::collections::{BTreeSet, VecDeque};

use blocks_model::{ComponentRecord, HistoryEntry};
use serde_json::json;
use tracing::debug;

use crate::events;
use crate::store::StateStore;

#[derive(Debug, Clone, Default)]
pub(crate) struct History {
    entries: VecDeque<HistoryEntry>,
    cursor: usize,
    limit: usize,
}

impl History {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            cursor: 0,
            limit,
        }
    }

    /// Rebuild from exported parts. `applied` is the number of applied
    /// entries and must not exceed `entries.len()`.
    pub(crate) fn from_parts(entries: Vec<HistoryEntry>, applied: usize, limit: usize) -> Self {
        let mut history = Self {
            cursor: applied.min(entries.len()),
            entries: entries.into(),
            limit,
        };
        history.enforce_limit();
        history
    }

    pub(crate) fn set_limit(&mut self, limit: usize) {
        self.limit = limit;
        self.enforce_limit();
    }

    pub(crate) fn record(&mut self, entry: HistoryEntry) {
        self.entries.truncate(self.cursor);
        self.entries.push_back(entry);
        self.cursor = self.entries.len();
        self.enforce_limit();
    }

    fn enforce_limit(&mut self) {
        while self.entries.len() > self.limit {
            self.entries.pop_front();
            self.cursor = self.cursor.saturating_sub(1);
        }
    }

    fn step_back(&mut self) -> Option<HistoryEntry> {
        if self.cursor == 0 {
            return None;
        }
        self.cursor -= 1;
        self.entries.get(self.cursor).cloned()
    }

    fn step_forward(&mut self) -> Option<HistoryEntry> {
        let entry = self.entries.get(self.cursor).cloned()?;
        self.cursor += 1;
        Some(entry)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn cursor(&self) -> usize {
        self.cursor
    }

    pub(crate) fn iter(&self) -> impl ExactSizeIterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.cursor = 0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Backward,
    Forward,
}

impl StateStore {
    pub fn can_undo(&self) -> bool {
        self.history.cursor() > 0
    }

    pub fn can_redo(&self) -> bool {
        self.history.cursor() < self.history.len()
    }

    /// Recorded entries, oldest first, including any redo tail.
    pub fn history(&self) -> impl ExactSizeIterator<Item = &HistoryEntry> {
        self.history.iter()
    }

    /// Index of the last applied entry; -1 when nothing is applied.
    pub fn history_index(&self) -> i64 {
        i64::try_from(self.history.cursor()).unwrap_or(i64::MAX) - 1
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
        debug!("History cleared");
    }

    /// Reverse the last applied entry. Returns false when there is nothing
    /// to undo.
    pub fn undo(&mut self) -> bool {
        let Some(entry) = self.history.step_back() else {
            debug!("Nothing to undo");
            return false;
        };
        self.replay(&entry, Direction::Backward);
        self.announce(events::HISTORY_UNDO, &entry);
        true
    }

    /// Re-apply the next entry of the redo tail. Returns false when there is
    /// nothing to redo.
    pub fn redo(&mut self) -> bool {
        let Some(entry) = self.history.step_forward() else {
            debug!("Nothing to redo");
            return false;
        };
        self.replay(&entry, Direction::Forward);
        self.announce(events::HISTORY_REDO, &entry);
        true
    }

    fn replay(&mut self, entry: &HistoryEntry, direction: Direction) {
        self.apply_entry(entry, direction);
        let touched: BTreeSet<&str> = entry.component_ids().into_iter().collect();
        for id in touched {
            if self.records.contains_key(id) {
                self.update_component_metadata(id);
            }
        }
    }

    fn announce(&self, event_type: &str, entry: &HistoryEntry) {
        debug!(kind = entry.kind(), label = %entry.label(), history_index = self.history_index(), "{event_type}");
        self.emit(
            event_type,
            json!({
                "kind": entry.kind(),
                "label": entry.label(),
                "componentIds": entry.component_ids(),
                "historyIndex": self.history_index(),
            }),
        );
    }

    fn apply_entry(&mut self, entry: &HistoryEntry, direction: Direction) {
        match entry {
            HistoryEntry::StateChange { previous, next, .. } => {
                let target = match direction {
                    Direction::Backward => previous,
                    Direction::Forward => next,
                };
                self.restore(target);
            }
            HistoryEntry::ComponentCreated { id, record, .. } => match direction {
                Direction::Backward => {
                    self.records.remove(id);
                }
                Direction::Forward => {
                    self.records.insert(id.clone(), record.clone());
                }
            },
            HistoryEntry::ComponentRemoved {
                id,
                record,
                parent_slot,
                descendants,
                ..
            } => match direction {
                Direction::Backward => {
                    for restored in std::iter::once(record).chain(descendants) {
                        self.records.insert(restored.id.clone(), restored.clone());
                    }
                    if let Some(slot) = parent_slot
                        && let Some(parent) = self.records.get_mut(&slot.parent_id)
                        && !parent.has_child(id)
                    {
                        let at = slot.index.min(parent.children.len());
                        parent.children.insert(at, id.clone());
                    }
                }
                Direction::Forward => {
                    for removed in std::iter::once(record).chain(descendants) {
                        self.records.remove(&removed.id);
                    }
                    if let Some(slot) = parent_slot
                        && let Some(parent) = self.records.get_mut(&slot.parent_id)
                    {
                        parent.children.retain(|child| child != id);
                    }
                }
            },
            HistoryEntry::Transaction { entries, .. } => match direction {
                Direction::Backward => {
                    for inner in entries.iter().rev() {
                        self.apply_entry(inner, direction);
                    }
                }
                Direction::Forward => {
                    for inner in entries {
                        self.apply_entry(inner, direction);
                    }
                }
            },
        }
    }

    /// Put back an exact copy of `target` and tell its subscribers.
    fn restore(&mut self, target: &ComponentRecord) {
        if let Some(previous) = self.records.insert(target.id.clone(), target.clone()) {
            self.notify(target, &previous);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blocks_model::{ComponentInit, StatePatch};
    use chrono::Utc;

    fn created(id: &str) -> HistoryEntry {
        HistoryEntry::ComponentCreated {
            id: id.to_string(),
            record: ComponentInit::new("layout", "Section")
                .with_id(id)
                .into_record(Utc::now()),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn recording_truncates_redo_tail() {
        let mut history = History::new(10);
        history.record(created("a"));
        history.record(created("b"));
        assert!(history.step_back().is_some());
        history.record(created("c"));
        assert_eq!(history.len(), 2);
        assert_eq!(history.cursor(), 2);
        let ids: Vec<Vec<&str>> = history.iter().map(HistoryEntry::component_ids).collect();
        assert_eq!(ids, vec![vec!["a"], vec!["c"]]);
    }

    #[test]
    fn bound_drops_oldest_and_clamps_cursor() {
        let mut history = History::new(2);
        for id in ["a", "b", "c"] {
            history.record(created(id));
        }
        assert_eq!(history.len(), 2);
        assert_eq!(history.cursor(), 2);

        let history = History::from_parts(vec![created("a"), created("b"), created("c")], 1, 2);
        assert_eq!(history.len(), 2);
        assert_eq!(history.cursor(), 0);
    }

    #[test]
    fn undo_and_redo_state_change() {
        let mut store = StateStore::default();
        store
            .initialize_state(ComponentInit::new("layout", "Section").with_id("a"))
            .expect("init");
        let before = store.get_state("a").cloned().expect("record");
        store
            .set_state("a", StatePatch::new().selected(true), false)
            .expect("set");
        let after = store.get_state("a").cloned().expect("record");

        assert!(store.undo());
        assert_eq!(store.get_state("a"), Some(&before));
        assert_eq!(store.history_index(), 0);
        assert!(store.redo());
        assert_eq!(store.get_state("a"), Some(&after));
        assert!(!store.redo());
    }

    #[test]
    fn undo_of_creation_removes_record() {
        let mut store = StateStore::default();
        store
            .initialize_state(ComponentInit::new("layout", "Section").with_id("a"))
            .expect("init");
        assert!(store.undo());
        assert!(!store.contains("a"));
        assert_eq!(store.history_index(), -1);
        assert!(!store.undo());
        assert!(store.redo());
        assert!(store.contains("a"));
    }

    #[test]
    fn store_history_is_bounded() {
        let mut store = StateStore::default()
            .with_options(crate::StoreOptions::default().with_max_history(3));
        store
            .initialize_state(ComponentInit::new("layout", "Section").with_id("a"))
            .expect("init");
        for step in 0..5 {
            store
                .set_state("a", StatePatch::new().selected(step % 2 == 0), false)
                .expect("set");
        }
        assert_eq!(store.history().len(), 3);
        assert_eq!(store.history_index(), 2);
        store.clear_history();
        assert!(!store.can_undo());
        assert!(!store.can_redo());
    }
}
