//! Owned tree snapshots of the forest.

use std::collections::HashSet;

use blocks_model::ComponentRecord;
use serde::Serialize;
use tracing::warn;

use crate::store::StateStore;

/// A record with its children expanded. Detached from the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    #[serde(flatten)]
    pub record: ComponentRecord,
    pub child_nodes: Vec<TreeNode>,
}

impl TreeNode {
    pub fn id(&self) -> &str {
        &self.record.id
    }

    /// Nodes in this subtree, including `self`.
    pub fn size(&self) -> usize {
        1 + self.child_nodes.iter().map(TreeNode::size).sum::<usize>()
    }

    /// Pre-order walk; `f` receives each node and its level below `self`.
    pub fn walk<'a, F>(&'a self, f: &mut F)
    where
        F: FnMut(&'a TreeNode, usize),
    {
        let mut stack = vec![(self, 0)];
        while let Some((node, level)) = stack.pop() {
            f(node, level);
            stack.extend(node.child_nodes.iter().rev().map(|child| (child, level + 1)));
        }
    }
}

impl StateStore {
    /// Every root (record without a parent) expanded into a tree, ordered by
    /// `(created, id)`.
    pub fn get_full_tree(&self) -> Vec<TreeNode> {
        let mut visited = HashSet::new();
        self.records()
            .into_iter()
            .filter(|record| record.is_root())
            .filter_map(|record| self.expand(&record.id, &mut visited))
            .collect()
    }

    /// The subtree rooted at `id`.
    pub fn subtree(&self, id: &str) -> Option<TreeNode> {
        self.expand(id, &mut HashSet::new())
    }

    fn expand<'a>(&'a self, id: &'a str, visited: &mut HashSet<&'a str>) -> Option<TreeNode> {
        if !visited.insert(id) {
            warn!(component_id = %id, "Component reached twice while building tree");
            return None;
        }
        let record = self.records.get(id)?;
        let child_nodes = record
            .children
            .iter()
            .filter_map(|child| self.expand(child, visited))
            .collect();
        Some(TreeNode {
            record: record.clone(),
            child_nodes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blocks_model::ComponentInit;

    #[test]
    fn tree_nests_children_in_order() {
        let mut store = StateStore::default();
        for id in ["page", "hero", "body", "title"] {
            store
                .initialize_state(ComponentInit::new("layout", "Section").with_id(id))
                .expect("init");
        }
        store.add_child("page", "hero").expect("add");
        store.add_child("page", "body").expect("add");
        store.add_child("hero", "title").expect("add");

        let tree = store.get_full_tree();
        assert_eq!(tree.len(), 1);
        let page = &tree[0];
        assert_eq!(page.size(), 4);
        let mut order = Vec::new();
        page.walk(&mut |node, level| order.push((node.id().to_string(), level)));
        assert_eq!(
            order,
            vec![
                ("page".to_string(), 0),
                ("hero".to_string(), 1),
                ("title".to_string(), 2),
                ("body".to_string(), 1),
            ]
        );
    }

    #[test]
    fn tree_survives_cycles_and_dangling_children() {
        let mut store = StateStore::default();
        for id in ["a", "b"] {
            store
                .initialize_state(ComponentInit::new("layout", "Section").with_id(id))
                .expect("init");
        }
        store.add_child("a", "b").expect("add");
        // Corrupt the forest directly: b lists a, and a lists a missing id.
        store.records.get_mut("b").expect("b").children.push("a".into());
        store.records.get_mut("a").expect("a").children.push("ghost".into());

        let tree = store.get_full_tree();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].size(), 2);
    }
}
