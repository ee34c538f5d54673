//! Derived depth/index metadata.

use std::collections::{HashMap, HashSet};

use blocks_model::{ComponentMetadata, ComponentRecord};
use tracing::{debug, warn};

use crate::store::StateStore;

/// Number of ancestors above `id`, following `parent` pointers.
///
/// The walk stops at a dangling parent id. A parent chain that loops back on
/// itself logs a warning and yields 0.
pub fn compute_depth(records: &HashMap<String, ComponentRecord>, id: &str) -> usize {
    let mut visited: HashSet<&str> = HashSet::new();
    visited.insert(id);
    let mut depth = 0;
    let mut next = records.get(id).and_then(|record| record.parent.as_deref());
    while let Some(parent_id) = next {
        if !visited.insert(parent_id) {
            warn!(component_id = %id, parent_id = %parent_id, "Cycle in parent chain; using depth 0");
            return 0;
        }
        let Some(parent) = records.get(parent_id) else {
            break;
        };
        depth += 1;
        next = parent.parent.as_deref();
    }
    depth
}

/// Position of `id` inside its parent's `children`; 0 for roots and for
/// records their parent does not list.
pub fn index_in_parent(records: &HashMap<String, ComponentRecord>, id: &str) -> usize {
    records
        .get(id)
        .and_then(|record| record.parent.as_deref())
        .and_then(|parent_id| records.get(parent_id))
        .and_then(|parent| parent.children.iter().position(|child| child == id))
        .unwrap_or(0)
}

impl StateStore {
    /// Recompute metadata for `id` and every descendant.
    ///
    /// While a batch is open the id is only remembered; the batch recomputes
    /// it once when it closes.
    pub fn update_component_metadata(&mut self, id: &str) {
        if self.batch_depth > 0 {
            self.batch_touched.insert(id.to_string());
            return;
        }
        self.refresh_subtree(id);
    }

    fn metadata_for(&self, id: &str) -> ComponentMetadata {
        let depth = self
            .policy
            .as_ref()
            .and_then(|policy| policy.component_depth(id))
            .unwrap_or_else(|| compute_depth(&self.records, id));
        ComponentMetadata {
            depth,
            index: index_in_parent(&self.records, id),
        }
    }

    /// Iterative walk over the subtree rooted at `id`.
    pub(crate) fn refresh_subtree(&mut self, id: &str) {
        let mut visited: HashSet<String> = HashSet::new();
        let mut stack = vec![id.to_string()];
        while let Some(current) = stack.pop() {
            if !visited.insert(current.clone()) {
                warn!(component_id = %current, root = %id, "Component reached twice while propagating metadata");
                continue;
            }
            let metadata = self.metadata_for(&current);
            let Some(record) = self.records.get_mut(&current) else {
                continue;
            };
            record.metadata = metadata;
            stack.extend(record.children.iter().rev().cloned());
        }
        debug!(component_id = %id, visited = visited.len(), "Metadata recomputed");
    }

    /// Recompute metadata for every record.
    pub(crate) fn refresh_all(&mut self) {
        let computed: Vec<(String, ComponentMetadata)> = self
            .records
            .keys()
            .map(|id| (id.clone(), self.metadata_for(id)))
            .collect();
        for (id, metadata) in computed {
            if let Some(record) = self.records.get_mut(&id) {
                record.metadata = metadata;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blocks_model::ComponentInit;
    use chrono::Utc;

    fn forest(links: &[(&str, Option<&str>)]) -> HashMap<String, ComponentRecord> {
        let now = Utc::now();
        let mut records: HashMap<String, ComponentRecord> = links
            .iter()
            .map(|(id, parent)| {
                let mut record = ComponentInit::new("layout", "Section")
                    .with_id(*id)
                    .into_record(now);
                record.parent = parent.map(str::to_string);
                (id.to_string(), record)
            })
            .collect();
        for (id, parent) in links {
            if let Some(parent) = parent
                && let Some(record) = records.get_mut(*parent)
            {
                record.children.push(id.to_string());
            }
        }
        records
    }

    #[test]
    fn depth_counts_ancestors() {
        let records = forest(&[("a", None), ("b", Some("a")), ("c", Some("b"))]);
        assert_eq!(compute_depth(&records, "a"), 0);
        assert_eq!(compute_depth(&records, "c"), 2);
        assert_eq!(index_in_parent(&records, "b"), 0);
    }

    #[test]
    fn depth_on_cycle_is_zero() {
        let records = forest(&[("a", Some("c")), ("b", Some("a")), ("c", Some("b"))]);
        assert_eq!(compute_depth(&records, "a"), 0);
        assert_eq!(compute_depth(&records, "b"), 0);
    }

    #[test]
    fn self_parent_is_a_cycle() {
        let records = forest(&[("a", Some("a"))]);
        assert_eq!(compute_depth(&records, "a"), 0);
    }

    #[test]
    fn dangling_parent_stops_walk() {
        let records = forest(&[("a", Some("ghost"))]);
        assert_eq!(compute_depth(&records, "a"), 0);
        assert_eq!(index_in_parent(&records, "a"), 0);
    }
}
