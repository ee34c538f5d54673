use std::sync::{Arc, Mutex};

use blocks_events::{Event, EventBus, SubscribeOptions};
use blocks_model::{ComponentInit, StatePatch, ValidationCode};
use blocks_state::{StateError, StateStore, TreeNode, events};

fn section(id: &str) -> ComponentInit {
    ComponentInit::new("layout", "Section").with_id(id)
}

fn recording_bus(types: &[&str]) -> (EventBus, Arc<Mutex<Vec<Event>>>) {
    let bus = EventBus::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    for event_type in types {
        let sink = Arc::clone(&seen);
        bus.subscribe(
            *event_type,
            move |event: &Event| {
                sink.lock().expect("lock").push(event.clone());
                Ok(())
            },
            SubscribeOptions::default(),
        )
        .expect("subscribe");
    }
    (bus, seen)
}

fn mentions(nodes: &[TreeNode], id: &str) -> bool {
    nodes.iter().any(|root| {
        let mut found = false;
        root.walk(&mut |node, _| {
            if node.id() == id || node.record.children.iter().any(|child| child == id) {
                found = true;
            }
        });
        found
    })
}

#[test]
fn add_remove_and_remove_state_scenario() {
    let mut store = StateStore::default();
    store.initialize_state(section("A")).expect("init A");
    store.initialize_state(section("B")).expect("init B");

    store.add_child("A", "B").expect("add");
    let a = store.get_state("A").expect("A");
    let b = store.get_state("B").expect("B");
    assert_eq!(a.children, vec!["B"]);
    assert_eq!(b.parent.as_deref(), Some("A"));
    assert_eq!(b.metadata.depth, 1);

    assert!(store.remove_child("A", "B"));
    assert!(store.get_state("A").expect("A").children.is_empty());
    assert_eq!(store.get_state("B").expect("B").parent, None);

    assert!(store.remove_state("A"));
    let tree = store.get_full_tree();
    assert!(!mentions(&tree, "A"));
    assert_eq!(tree.len(), 1);
    assert!(store.check_integrity().issues.is_empty());
}

#[test]
fn structural_events_are_published_in_order() {
    let (bus, seen) = recording_bus(&[
        events::STATE_INITIALIZED,
        events::CHILD_ADDED,
        events::COMPONENT_MOVED,
        events::CHILD_REMOVED,
        events::STATE_REMOVED,
        events::HISTORY_UNDO,
        events::HISTORY_REDO,
    ]);
    let mut store = StateStore::new(bus);
    store.initialize_state(section("page")).expect("init");
    store.initialize_state(section("aside")).expect("init");
    store
        .add_child("page", ComponentInit::new("basic", "Text").with_id("t"))
        .expect("add");
    store.move_component("t", "aside", Some(0)).expect("move");
    assert!(store.remove_child("aside", "t"));
    assert!(store.remove_state("t"));
    assert!(store.undo());
    assert!(store.redo());

    let seen = seen.lock().expect("lock");
    let types: Vec<&str> = seen.iter().map(|event| event.event_type.as_str()).collect();
    assert_eq!(
        types,
        vec![
            "state:initialized",
            "state:initialized",
            "state:initialized",
            "child:added",
            "component:moved",
            "child:removed",
            "state:removed",
            "history:undo",
            "history:redo",
        ]
    );
    let moved = &seen[4];
    assert_eq!(moved.get_str("from"), Some("page"));
    assert_eq!(moved.get_str("to"), Some("aside"));
    assert!(seen.iter().all(|event| event.source == "state-store"));
}

#[test]
fn rejected_change_publishes_validation_failed() {
    let (bus, seen) = recording_bus(&[events::VALIDATION_FAILED, events::STATE_CHANGED]);
    let mut store = StateStore::new(bus);
    store.initialize_state(section("a")).expect("init");

    let err = store
        .set_state("a", StatePatch::new().parent(Some("ghost".into())), false)
        .unwrap_err();
    assert!(matches!(err, StateError::ValidationFailed(_)));

    let seen = seen.lock().expect("lock");
    assert_eq!(seen.len(), 1);
    let event = &seen[0];
    assert_eq!(event.event_type, "validation-failed");
    assert_eq!(event.get_str("componentId"), Some("a"));
    let errors = event.get("errors").and_then(|v| v.as_array()).expect("errors");
    assert_eq!(errors[0]["code"], "invalid-parent");
}

#[test]
fn move_to_index_zero_puts_component_first() {
    let mut store = StateStore::default();
    for id in ["p", "old", "x", "y", "z"] {
        store.initialize_state(section(id)).expect("init");
    }
    store.add_child("p", "y").expect("add");
    store.add_child("p", "z").expect("add");
    store.add_child("old", "x").expect("add");

    store.move_component("x", "p", Some(0)).expect("move");
    assert_eq!(store.get_state("p").expect("p").children, vec!["x", "y", "z"]);
    assert!(!store.get_state("old").expect("old").has_child("x"));
    let indexes: Vec<usize> = ["x", "y", "z"]
        .iter()
        .map(|id| store.get_state(id).expect("record").metadata.index)
        .collect();
    assert_eq!(indexes, vec![0, 1, 2]);
}

#[test]
fn moving_into_descendant_is_a_cycle() {
    let mut store = StateStore::default();
    for id in ["a", "b", "c"] {
        store.initialize_state(section(id)).expect("init");
    }
    store.add_child("a", "b").expect("add");
    store.add_child("b", "c").expect("add");
    let history_len = store.history().len();

    let err = store.move_component("a", "c", Some(0)).unwrap_err();
    assert!(
        err.report()
            .expect("report")
            .has_code(ValidationCode::CycleDetected)
    );
    assert_eq!(store.history().len(), history_len);
    assert_eq!(store.get_state("a").expect("a").parent, None);
}

#[test]
fn undo_single_mutation_is_exact() {
    let mut store = StateStore::default();
    for id in ["a", "b", "c"] {
        store.initialize_state(section(id)).expect("init");
    }
    store.add_child("a", "b").expect("add");

    let before = store.export_state().states;
    store.move_component("b", "c", None).expect("move");
    let after = store.export_state().states;

    assert!(store.undo());
    assert_eq!(store.export_state().states, before);
    assert!(store.redo());
    assert_eq!(store.export_state().states, after);
}

#[test]
fn depth_follows_nesting_after_moves() {
    let mut store = StateStore::default();
    for id in ["root", "a", "b", "leaf"] {
        store.initialize_state(section(id)).expect("init");
    }
    store.add_child("root", "a").expect("add");
    store.add_child("a", "b").expect("add");
    store.add_child("b", "leaf").expect("add");
    assert_eq!(store.get_state("leaf").expect("leaf").metadata.depth, 3);

    store.move_component("b", "root", None).expect("move");
    assert_eq!(store.get_state("b").expect("b").metadata.depth, 1);
    assert_eq!(store.get_state("leaf").expect("leaf").metadata.depth, 2);
    assert_eq!(store.get_state("b").expect("b").metadata.index, 1);
}

#[test]
fn subtree_export_round_trips_through_json() {
    let mut store = StateStore::default();
    store.initialize_state(section("page")).expect("init");
    store
        .add_child("page", ComponentInit::new("basic", "Text").with_id("t"))
        .expect("add");

    let text = store.export_state().to_json_pretty().expect("json");
    let snapshot = blocks_model::StateSnapshot::from_json(&text).expect("parse");
    let mut restored = StateStore::default();
    restored.import_state(snapshot).expect("import");
    assert_eq!(
        restored.subtree("page").map(|node| node.size()),
        Some(2)
    );
    assert_eq!(restored.history_index(), store.history_index());
}
