//! Structural operations: attaching, detaching, moving and removing
//! components.
//!
//! Each operation prepares every record it touches before committing any of
//! them and records a single history entry, so one undo reverses it.

use std::collections::HashSet;

use blocks_model::{
    ComponentInit, ComponentRecord, HistoryEntry, ParentSlot, StatePatch, ValidationCode,
};
use chrono::Utc;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::Result;
use crate::events;
use crate::store::{Committed, Pending, StateStore};

/// The child argument of [`StateStore::add_child`].
#[derive(Debug, Clone, PartialEq)]
pub enum ChildRef {
    /// A record already in the store.
    Existing(String),
    /// A record to create and attach in one step.
    New(ComponentInit),
}

impl From<&str> for ChildRef {
    fn from(id: &str) -> Self {
        Self::Existing(id.to_string())
    }
}

impl From<String> for ChildRef {
    fn from(id: String) -> Self {
        Self::Existing(id)
    }
}

impl From<ComponentInit> for ChildRef {
    fn from(init: ComponentInit) -> Self {
        Self::New(init)
    }
}

impl StateStore {
    /// Attach a child to `parent_id`, creating it first for
    /// [`ChildRef::New`]. A child that currently sits under another parent
    /// is detached from it. Re-adding an existing child leaves the list
    /// alone but still rewrites the child's pointer and metadata.
    ///
    /// Every affected record is validated before anything is stored, so a
    /// rejected call leaves no trace, not even a freshly created child.
    ///
    /// # Errors
    ///
    /// `StateError::NotFound` when the parent or an existing child is
    /// unknown, `StateError::ValidationFailed` when the placement is
    /// refused.
    pub fn add_child(
        &mut self,
        parent_id: &str,
        child: impl Into<ChildRef>,
    ) -> Result<ComponentRecord> {
        let parent = self.require(parent_id)?;

        let (child_id, fresh) = match child.into() {
            ChildRef::Existing(id) => {
                self.require(&id)?;
                (id, None)
            }
            ChildRef::New(init) => {
                let record = self.build_record(init)?;
                let mut placed = record.clone();
                placed.parent = Some(parent_id.to_string());
                self.prepare_candidate(record.clone(), placed)?;
                (record.id.clone(), Some(record))
            }
        };

        // The parent's new children list must resolve, so a fresh child sits
        // in the map while the rest is prepared and is taken out on failure.
        if let Some(record) = &fresh {
            self.records.insert(child_id.clone(), record.clone());
        }
        let prepared = self.prepare_attach(&parent, &child_id);
        let (old_parent, pendings) = match prepared {
            Ok(prepared) => prepared,
            Err(error) => {
                if fresh.is_some() {
                    self.records.remove(&child_id);
                }
                return Err(error);
            }
        };

        let mut entries = Vec::new();
        if let Some(record) = fresh {
            entries.push(self.announce_created(record));
        }
        let committed = self.commit_all(pendings);
        entries.extend(committed.iter().map(Committed::entry));
        self.history.record(HistoryEntry::Transaction {
            label: format!("add {child_id} to {parent_id}"),
            entries,
            timestamp: Utc::now(),
        });
        for change in &committed {
            self.publish_committed(change);
        }

        let record = self.require(&child_id)?;
        debug!(parent_id = %parent_id, child_id = %child_id, index = record.metadata.index, "Child added");
        self.emit(
            events::CHILD_ADDED,
            json!({
                "parentId": parent_id,
                "childId": child_id,
                "index": record.metadata.index,
                "previousParentId": old_parent,
            }),
        );
        Ok(record)
    }

    /// Prepare the old parent, the new parent and the child for an attach.
    /// Returns the old parent id (when it differs) and the pending changes
    /// in commit order.
    fn prepare_attach(
        &self,
        parent: &ComponentRecord,
        child_id: &str,
    ) -> Result<(Option<String>, Vec<Pending>)> {
        let parent_id = parent.id.as_str();
        let child_pending =
            self.prepare(child_id, StatePatch::new().parent(Some(parent_id.to_string())))?;
        let old_parent = child_pending
            .previous
            .parent
            .clone()
            .filter(|old| old != parent_id);

        let mut pendings = Vec::with_capacity(3);
        if let Some(old) = old_parent.as_deref()
            && self.contains(old)
        {
            pendings.push(self.detach_pending(old, child_id)?);
        }
        if !parent.has_child(child_id) {
            let mut children = parent.children.clone();
            children.push(child_id.to_string());
            pendings.push(self.prepare(parent_id, StatePatch::new().children(children))?);
        }
        pendings.push(child_pending);
        Ok((old_parent, pendings))
    }

    /// Detach `child_id` from `parent_id`. The child record is kept as a
    /// root. Returns false when either side is unknown or they are not
    /// linked.
    pub fn remove_child(&mut self, parent_id: &str, child_id: &str) -> bool {
        let (Some(parent), Some(child)) = (self.records.get(parent_id), self.records.get(child_id))
        else {
            warn!(parent_id = %parent_id, child_id = %child_id, "Cannot remove child: component not found");
            return false;
        };
        let listed = parent.has_child(child_id);
        let points = child.parent.as_deref() == Some(parent_id);
        if !listed && !points {
            debug!(parent_id = %parent_id, child_id = %child_id, "Not a child of this parent");
            return false;
        }

        let pendings = match self.prepare_unlink(parent_id, child_id, listed, points) {
            Ok(pendings) => pendings,
            Err(error) => {
                warn!(parent_id = %parent_id, child_id = %child_id, %error, "Cannot remove child");
                return false;
            }
        };

        let committed = self.commit_all(pendings);
        self.history.record(HistoryEntry::Transaction {
            label: format!("remove {child_id} from {parent_id}"),
            entries: committed.iter().map(Committed::entry).collect(),
            timestamp: Utc::now(),
        });
        for change in &committed {
            self.publish_committed(change);
        }
        debug!(parent_id = %parent_id, child_id = %child_id, "Child removed");
        self.emit(
            events::CHILD_REMOVED,
            json!({ "parentId": parent_id, "childId": child_id }),
        );
        true
    }

    /// Move `id` under `new_parent_id` at `index` (appended when `None`,
    /// clamped to the list length otherwise).
    ///
    /// # Errors
    ///
    /// `StateError::NotFound` for unknown ids and
    /// `StateError::ValidationFailed` with `cycle-detected` when the
    /// target is the component itself or one of its descendants.
    pub fn move_component(
        &mut self,
        id: &str,
        new_parent_id: &str,
        index: Option<usize>,
    ) -> Result<ComponentRecord> {
        let record = self.require(id)?;
        let new_parent = self.require(new_parent_id)?;
        if id == new_parent_id || self.chain_reaches(new_parent_id, id) {
            return Err(self.structural_issue(
                id,
                ValidationCode::CycleDetected,
                format!("cannot move `{id}` into itself or one of its descendants"),
            ));
        }

        let old_parent = record.parent.clone();
        let child_pending =
            self.prepare(id, StatePatch::new().parent(Some(new_parent_id.to_string())))?;
        let old_pending = match old_parent.as_deref() {
            Some(old) if old != new_parent_id && self.contains(old) => {
                Some(self.detach_pending(old, id)?)
            }
            _ => None,
        };

        let mut children = new_parent.children;
        children.retain(|child| child != id);
        let position = index.map_or(children.len(), |index| index.min(children.len()));
        children.insert(position, id.to_string());
        let parent_pending =
            self.prepare(new_parent_id, StatePatch::new().children(children))?;

        let pendings = [old_pending, Some(parent_pending), Some(child_pending)]
            .into_iter()
            .flatten()
            .collect();
        let committed = self.commit_all(pendings);
        self.history.record(HistoryEntry::Transaction {
            label: format!("move {id} to {new_parent_id}"),
            entries: committed.iter().map(Committed::entry).collect(),
            timestamp: Utc::now(),
        });
        for change in &committed {
            self.publish_committed(change);
        }

        debug!(component_id = %id, from = ?old_parent, to = %new_parent_id, index = position, "Component moved");
        self.emit(
            events::COMPONENT_MOVED,
            json!({
                "componentId": id,
                "from": old_parent,
                "to": new_parent_id,
                "index": position,
            }),
        );
        self.require(id)
    }

    /// Delete `id`, scrubbing it from every `children` list. Its direct
    /// children stay in the store as roots. Returns false for an unknown id.
    pub fn remove_state(&mut self, id: &str) -> bool {
        self.remove_records(id, false)
    }

    /// Delete `id` together with every record nested under it. Returns false
    /// for an unknown id.
    pub fn remove_subtree(&mut self, id: &str) -> bool {
        self.remove_records(id, true)
    }

    fn remove_records(&mut self, id: &str, cascade: bool) -> bool {
        let Some(record) = self.records.get(id).cloned() else {
            warn!(component_id = %id, "Cannot remove state: component not found");
            return false;
        };
        let descendants = if cascade {
            self.collect_descendants(id)
        } else {
            Vec::new()
        };
        let removed: HashSet<String> = std::iter::once(id.to_string())
            .chain(descendants.iter().map(|record| record.id.clone()))
            .collect();

        let parent_slot = record.parent.as_deref().and_then(|parent_id| {
            let parent = self.records.get(parent_id)?;
            let index = parent.children.iter().position(|child| child == id)?;
            Some(ParentSlot {
                parent_id: parent_id.to_string(),
                index,
            })
        });

        // Survivors that still reference a removed record: parents lose the
        // child entry, orphaned children lose their parent pointer.
        let mut survivors: Vec<&ComponentRecord> = self
            .records
            .values()
            .filter(|other| !removed.contains(&other.id))
            .filter(|other| {
                other.children.iter().any(|child| removed.contains(child))
                    || other
                        .parent
                        .as_ref()
                        .is_some_and(|parent| removed.contains(parent))
            })
            .collect();
        survivors.sort_by(|a, b| a.id.cmp(&b.id));
        let scrubbed: Vec<Pending> = survivors
            .into_iter()
            .map(|other| {
                let mut candidate = other.clone();
                candidate.children.retain(|child| !removed.contains(child));
                if candidate
                    .parent
                    .as_ref()
                    .is_some_and(|parent| removed.contains(parent))
                {
                    candidate.parent = None;
                }
                Pending {
                    previous: other.clone(),
                    candidate,
                }
            })
            .collect();

        let committed = self.commit_all(scrubbed);
        for gone in &removed {
            self.records.remove(gone);
            self.drop_subscribers(gone);
        }
        let removed_entry = HistoryEntry::ComponentRemoved {
            id: id.to_string(),
            record,
            parent_slot,
            descendants: descendants.clone(),
            timestamp: Utc::now(),
        };
        if committed.is_empty() {
            self.history.record(removed_entry);
        } else {
            let mut entries: Vec<HistoryEntry> = committed.iter().map(Committed::entry).collect();
            entries.push(removed_entry);
            self.history.record(HistoryEntry::Transaction {
                label: format!("remove {id}"),
                entries,
                timestamp: Utc::now(),
            });
        }
        for change in &committed {
            self.publish_committed(change);
        }

        let removed_ids: Vec<&str> = std::iter::once(id)
            .chain(descendants.iter().map(|record| record.id.as_str()))
            .collect();
        debug!(component_id = %id, nested = descendants.len(), "State removed");
        self.emit(
            events::STATE_REMOVED,
            json!({ "componentId": id, "removedIds": removed_ids }),
        );
        true
    }

    /// Records nested under `id`, parent before child.
    fn collect_descendants(&self, id: &str) -> Vec<ComponentRecord> {
        let mut visited: HashSet<&str> = HashSet::new();
        visited.insert(id);
        let mut out = Vec::new();
        let mut stack: Vec<&str> = self
            .records
            .get(id)
            .map(|record| record.children.iter().rev().map(String::as_str).collect())
            .unwrap_or_default();
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            let Some(record) = self.records.get(current) else {
                continue;
            };
            out.push(record.clone());
            stack.extend(record.children.iter().rev().map(String::as_str));
        }
        out
    }

    fn prepare_unlink(
        &self,
        parent_id: &str,
        child_id: &str,
        listed: bool,
        points: bool,
    ) -> Result<Vec<Pending>> {
        let mut pendings = Vec::new();
        if listed {
            pendings.push(self.detach_pending(parent_id, child_id)?);
        }
        if points {
            pendings.push(self.prepare(child_id, StatePatch::new().parent(None))?);
        }
        Ok(pendings)
    }

    /// Prepare `parent_id` without `child_id` in its children.
    fn detach_pending(&self, parent_id: &str, child_id: &str) -> Result<Pending> {
        let parent = self.require(parent_id)?;
        let children = parent
            .children
            .iter()
            .filter(|child| *child != child_id)
            .cloned()
            .collect();
        self.prepare(parent_id, StatePatch::new().children(children))
    }
}
