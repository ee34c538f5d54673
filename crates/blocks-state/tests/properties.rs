use blocks_model::ComponentInit;
use blocks_state::{StateStore, TreeNode};
use proptest::prelude::*;

const IDS: [&str; 6] = ["n0", "n1", "n2", "n3", "n4", "n5"];

#[derive(Debug, Clone)]
enum Op {
    Add(usize, usize),
    RemoveChild(usize, usize),
    Move(usize, usize, Option<usize>),
    RemoveState(usize),
    RemoveSubtree(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let id = 0..IDS.len();
    prop_oneof![
        4 => (id.clone(), id.clone()).prop_map(|(p, c)| Op::Add(p, c)),
        2 => (id.clone(), id.clone()).prop_map(|(p, c)| Op::RemoveChild(p, c)),
        3 => (id.clone(), id.clone(), proptest::option::of(0usize..4))
            .prop_map(|(c, p, index)| Op::Move(c, p, index)),
        1 => id.clone().prop_map(Op::RemoveState),
        1 => id.prop_map(Op::RemoveSubtree),
    ]
}

fn seeded() -> StateStore {
    let mut store = StateStore::default();
    for id in IDS {
        store
            .initialize_state(ComponentInit::new("layout", "Section").with_id(id))
            .expect("init");
    }
    store.clear_history();
    store
}

/// Failed operations are expected (cycles, removed ids); they must simply
/// leave the store consistent.
fn apply(store: &mut StateStore, op: &Op) {
    match *op {
        Op::Add(p, c) => {
            let _ = store.add_child(IDS[p], IDS[c]);
        }
        Op::RemoveChild(p, c) => {
            store.remove_child(IDS[p], IDS[c]);
        }
        Op::Move(c, p, index) => {
            let _ = store.move_component(IDS[c], IDS[p], index);
        }
        Op::RemoveState(id) => {
            store.remove_state(IDS[id]);
        }
        Op::RemoveSubtree(id) => {
            store.remove_subtree(IDS[id]);
        }
    }
}

fn mentions(nodes: &[TreeNode], id: &str) -> bool {
    nodes.iter().any(|root| {
        let mut found = false;
        root.walk(&mut |node, _| {
            found |= node.id() == id || node.record.children.iter().any(|child| child == id);
        });
        found
    })
}

proptest! {
    #[test]
    fn structure_stays_consistent(ops in proptest::collection::vec(op_strategy(), 1..30)) {
        let mut store = seeded();
        for op in &ops {
            apply(&mut store, op);
            let report = store.check_integrity();
            prop_assert!(!report.has_errors(), "after {:?}: {}", op, report);
        }
    }

    #[test]
    fn removed_ids_leave_no_trace(
        ops in proptest::collection::vec(op_strategy(), 0..20),
        victim in 0..IDS.len(),
    ) {
        let mut store = seeded();
        for op in &ops {
            apply(&mut store, op);
        }
        let others = store.len() - usize::from(store.contains(IDS[victim]));
        store.remove_state(IDS[victim]);
        prop_assert!(!mentions(&store.get_full_tree(), IDS[victim]));
        prop_assert!(!store.contains(IDS[victim]));
        prop_assert_eq!(store.len(), others);
        prop_assert!(!store.check_integrity().has_errors());
    }

    #[test]
    fn undo_all_then_redo_all_matches_direct_run(
        ops in proptest::collection::vec(op_strategy(), 1..25),
    ) {
        let mut store = seeded();
        let baseline = store.export_state().states;
        for op in &ops {
            apply(&mut store, op);
        }
        let direct = store.export_state().states;
        let steps = store.history().len();

        let mut undone = 0;
        while store.undo() {
            undone += 1;
        }
        prop_assert_eq!(undone, steps);
        prop_assert_eq!(&store.export_state().states, &baseline);

        while store.redo() {}
        prop_assert_eq!(&store.export_state().states, &direct);
    }
}
