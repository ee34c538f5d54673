//! StateStore - the component forest plus its history and subscribers.
//!
//! # Commit Path
//!
//! Every change goes through the same three steps:
//!
//! 1. **prepare**: build the candidate record and validate it against the
//!    current forest. A rejected candidate publishes `validation-failed` and
//!    leaves the store untouched.
//! 2. **commit**: stamp `lastModified`, store the record and recompute
//!    metadata (deferred while a batch is open).
//! 3. **record**: push a history entry unless the caller asked to skip it.
//! 4. **publish**: notify subscribers, then publish `state:changed`.
//!
//! Structural operations prepare every affected record before committing any
//! of them, so a rejection never leaves a half-applied move.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use blocks_events::{EventBus, EventDraft};
use blocks_model::{
    ComponentInit, ComponentRecord, HistoryEntry, StatePatch, ValidationCode, ValidationIssue,
    ValidationReport,
};
use chrono::Utc;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::error::{Result, StateError};
use crate::events;
use crate::history::History;
use crate::options::StoreOptions;
use crate::policy::NestingPolicy;

/// Per-component change callback, called with `(new, previous)`.
pub type StateCallback =
    Arc<dyn Fn(&ComponentRecord, &ComponentRecord) -> anyhow::Result<()> + Send + Sync>;

/// Token returned by [`StateStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// A validated candidate waiting to be committed.
pub(crate) struct Pending {
    pub(crate) previous: ComponentRecord,
    pub(crate) candidate: ComponentRecord,
}

/// A stored change whose subscribers and event are still due.
pub(crate) struct Committed {
    pub(crate) previous: ComponentRecord,
    pub(crate) next: ComponentRecord,
}

impl Committed {
    pub(crate) fn entry(&self) -> HistoryEntry {
        HistoryEntry::StateChange {
            id: self.next.id.clone(),
            previous: self.previous.clone(),
            next: self.next.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// Owned component store. Construct one per document; nothing is global.
pub struct StateStore {
    pub(crate) records: HashMap<String, ComponentRecord>,
    pub(crate) history: History,
    subscribers: HashMap<String, Vec<(SubscriptionId, StateCallback)>>,
    next_subscription: u64,
    bus: EventBus,
    pub(crate) policy: Option<Arc<dyn NestingPolicy>>,
    pub(crate) options: StoreOptions,
    pub(crate) batch_depth: usize,
    pub(crate) batch_touched: BTreeSet<String>,
}

impl fmt::Debug for StateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateStore")
            .field("records", &self.records.len())
            .field("history", &self.history)
            .field("subscribers", &self.subscribers.len())
            .field("has_policy", &self.policy.is_some())
            .field("options", &self.options)
            .field("batch_depth", &self.batch_depth)
            .finish_non_exhaustive()
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(EventBus::new())
    }
}

impl StateStore {
    pub fn new(bus: EventBus) -> Self {
        let options = StoreOptions::default();
        Self {
            records: HashMap::new(),
            history: History::new(options.max_history),
            subscribers: HashMap::new(),
            next_subscription: 1,
            bus,
            policy: None,
            options,
            batch_depth: 0,
            batch_touched: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: Arc<dyn NestingPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: StoreOptions) -> Self {
        self.history.set_limit(options.max_history);
        self.options = options;
        self
    }

    pub fn set_policy(&mut self, policy: Option<Arc<dyn NestingPolicy>>) {
        self.policy = policy;
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// The bus the store publishes to.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    // --- reads ---

    pub fn get_state(&self, id: &str) -> Option<&ComponentRecord> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.records.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Records ordered by `(created, id)`.
    pub fn records(&self) -> Vec<&ComponentRecord> {
        let mut records: Vec<&ComponentRecord> = self.records.values().collect();
        records.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));
        records
    }

    // --- writes ---

    /// Create a root record.
    ///
    /// # Errors
    ///
    /// [`StateError::DuplicateId`] when the id is taken and
    /// [`StateError::ValidationFailed`] when a required field is blank.
    pub fn initialize_state(&mut self, init: ComponentInit) -> Result<ComponentRecord> {
        let record = self.build_record(init)?;
        let entry = self.insert_created(record.clone());
        self.history.record(entry);
        Ok(record)
    }

    /// Apply a partial update to an existing record.
    ///
    /// # Errors
    ///
    /// [`StateError::NotFound`] for an unknown id and
    /// [`StateError::ValidationFailed`] when the result would be invalid.
    pub fn set_state(
        &mut self,
        id: &str,
        patch: StatePatch,
        skip_history: bool,
    ) -> Result<ComponentRecord> {
        let pending = self.prepare(id, patch)?;
        let committed = self.commit(pending);
        if !skip_history {
            self.history.record(committed.entry());
        }
        self.publish_committed(&committed);
        Ok(committed.next)
    }

    /// Replace or merge a record's props.
    ///
    /// # Errors
    ///
    /// Same as [`StateStore::set_state`].
    pub fn update_props(
        &mut self,
        id: &str,
        props: Map<String, Value>,
        merge: bool,
    ) -> Result<ComponentRecord> {
        let record = self.require(id)?;
        let props = if merge {
            let mut merged = record.props;
            merged.extend(props);
            merged
        } else {
            props
        };
        self.set_state(id, StatePatch::new().props(props), false)
    }

    // --- subscribers ---

    /// Watch a single record. The callback runs after every commit of `id`,
    /// including undo and redo.
    pub fn subscribe<F>(&mut self, id: impl Into<String>, callback: F) -> SubscriptionId
    where
        F: Fn(&ComponentRecord, &ComponentRecord) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let sub = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers
            .entry(id.into())
            .or_default()
            .push((sub, Arc::new(callback)));
        sub
    }

    pub fn unsubscribe(&mut self, id: &str, sub: SubscriptionId) -> bool {
        let Some(callbacks) = self.subscribers.get_mut(id) else {
            return false;
        };
        let before = callbacks.len();
        callbacks.retain(|(existing, _)| *existing != sub);
        let removed = callbacks.len() != before;
        if callbacks.is_empty() {
            self.subscribers.remove(id);
        }
        removed
    }

    pub fn subscriber_count(&self, id: &str) -> usize {
        self.subscribers.get(id).map_or(0, Vec::len)
    }

    pub(crate) fn clear_subscribers(&mut self) {
        self.subscribers.clear();
    }

    pub(crate) fn drop_subscribers(&mut self, id: &str) {
        self.subscribers.remove(id);
    }

    pub(crate) fn notify(&self, next: &ComponentRecord, previous: &ComponentRecord) {
        let Some(callbacks) = self.subscribers.get(&next.id) else {
            return;
        };
        for (sub, callback) in callbacks {
            match catch_unwind(AssertUnwindSafe(|| callback(next, previous))) {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    warn!(component_id = %next.id, subscription = sub.0, %error, "State subscriber failed");
                }
                Err(_) => {
                    warn!(component_id = %next.id, subscription = sub.0, "State subscriber panicked");
                }
            }
        }
    }

    // --- internals shared by the other store modules ---

    /// Clone of the record under `id`, or `NotFound` with a warning.
    pub(crate) fn require(&self, id: &str) -> Result<ComponentRecord> {
        match self.records.get(id) {
            Some(record) => Ok(record.clone()),
            None => {
                warn!(component_id = %id, "Component not found");
                Err(StateError::NotFound(id.to_string()))
            }
        }
    }

    /// Turn an init into a record without storing it.
    pub(crate) fn build_record(&self, init: ComponentInit) -> Result<ComponentRecord> {
        let record = init.into_record(Utc::now());
        if self.records.contains_key(&record.id) {
            warn!(component_id = %record.id, "Duplicate component id");
            return Err(StateError::DuplicateId(record.id));
        }
        let mut report = ValidationReport::for_component(&record.id);
        crate::validation::check_required(&record, &mut report);
        if report.has_errors() {
            return Err(self.reject(report));
        }
        Ok(record)
    }

    /// Store a freshly built record and announce it.
    pub(crate) fn insert_created(&mut self, record: ComponentRecord) -> HistoryEntry {
        self.records.insert(record.id.clone(), record.clone());
        self.announce_created(record)
    }

    /// Publish `state:initialized` for a record already in the map.
    pub(crate) fn announce_created(&self, record: ComponentRecord) -> HistoryEntry {
        let id = record.id.clone();
        debug!(component_id = %id, component = %record.component, "Component initialized");
        self.emit(
            events::STATE_INITIALIZED,
            json!({ "componentId": id, "state": record }),
        );
        HistoryEntry::ComponentCreated {
            id,
            record,
            timestamp: Utc::now(),
        }
    }

    /// Validate `patch` applied to `id` without changing anything.
    pub(crate) fn prepare(&self, id: &str, patch: StatePatch) -> Result<Pending> {
        let previous = self.require(id)?;
        let candidate = patch.apply_to(&previous);
        self.prepare_candidate(previous, candidate)
    }

    pub(crate) fn prepare_candidate(
        &self,
        previous: ComponentRecord,
        candidate: ComponentRecord,
    ) -> Result<Pending> {
        let report = self.validate_state_change(&previous.id, &candidate);
        for issue in report.warnings() {
            warn!(component_id = %previous.id, code = issue.code.as_str(), "{}", issue.message);
        }
        if report.has_errors() {
            return Err(self.reject(report));
        }
        Ok(Pending {
            previous,
            candidate,
        })
    }

    /// Publish `validation-failed` and wrap the report in an error.
    pub(crate) fn reject(&self, report: ValidationReport) -> StateError {
        warn!(
            component_id = report.component_id.as_deref().unwrap_or_default(),
            errors = report.error_count(),
            "Rejected invalid state change: {report}"
        );
        let issues: Vec<&ValidationIssue> = report.errors().collect();
        self.emit(
            events::VALIDATION_FAILED,
            json!({ "componentId": report.component_id, "errors": issues }),
        );
        StateError::ValidationFailed(report)
    }

    /// Store a prepared candidate. Subscribers and `state:changed` wait for
    /// [`StateStore::publish_committed`], after the history entry is recorded.
    pub(crate) fn commit(&mut self, pending: Pending) -> Committed {
        let Pending {
            previous,
            mut candidate,
        } = pending;
        let id = previous.id.clone();
        candidate.touch();
        self.records.insert(id.clone(), candidate.clone());
        self.update_component_metadata(&id);

        let next = self.records.get(&id).cloned().unwrap_or(candidate);
        Committed { previous, next }
    }

    /// Commit every pending change in order.
    pub(crate) fn commit_all(&mut self, pendings: Vec<Pending>) -> Vec<Committed> {
        pendings
            .into_iter()
            .map(|pending| self.commit(pending))
            .collect()
    }

    /// Notify subscribers of a committed change, then publish `state:changed`.
    pub(crate) fn publish_committed(&self, committed: &Committed) {
        let Committed { previous, next } = committed;
        self.notify(next, previous);
        let changes = ComponentRecord::diff(previous, next);
        debug!(component_id = %next.id, changed = changes.len(), "State committed");
        self.emit(
            events::STATE_CHANGED,
            json!({
                "componentId": next.id,
                "state": next,
                "previousState": previous,
                "changes": changes,
            }),
        );
    }

    /// Publish a store event. Bus failures are logged, never surfaced.
    pub(crate) fn emit(&self, event_type: &str, payload: Value) {
        let mut draft = EventDraft::new(event_type).with_source(&self.options.event_source);
        if let Value::Object(map) = payload {
            draft = draft.with_payload(map);
        }
        if let Err(error) = self.bus.publish(draft) {
            warn!(event_type, %error, "Failed to publish store event");
        }
    }

    /// Issue for a rejected structural request that never reached validation.
    pub(crate) fn structural_issue(
        &self,
        id: &str,
        code: ValidationCode,
        message: String,
    ) -> StateError {
        let mut report = ValidationReport::for_component(id);
        report.push(ValidationIssue::error(code, message).with_component(id));
        self.reject(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blocks_events::SubscribeOptions;
    use std::sync::Mutex;

    fn store() -> StateStore {
        StateStore::default()
    }

    fn section(id: &str) -> ComponentInit {
        ComponentInit::new("layout", "Section").with_id(id)
    }

    #[test]
    fn initialize_creates_root() {
        let mut store = store();
        let record = store.initialize_state(section("a")).expect("init");
        assert!(record.is_root());
        assert_eq!(record.metadata.depth, 0);
        assert_eq!(record.metadata.index, 0);
        assert!(store.contains("a"));
        assert_eq!(store.history().len(), 1);
    }

    #[test]
    fn initialize_rejects_duplicates_and_blank_fields() {
        let mut store = store();
        store.initialize_state(section("a")).expect("init");
        let err = store.initialize_state(section("a")).unwrap_err();
        assert!(matches!(err, StateError::DuplicateId(ref id) if id == "a"));

        let err = store
            .initialize_state(ComponentInit::new("", "Section"))
            .unwrap_err();
        let report = err.report().expect("validation report");
        assert!(report.has_code(ValidationCode::MissingField));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn set_state_unknown_id_is_not_found() {
        let mut store = store();
        let err = store
            .set_state("ghost", StatePatch::new().selected(true), false)
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(store.is_empty());
    }

    #[test]
    fn set_state_commits_and_records() {
        let mut store = store();
        let created = store.initialize_state(section("a")).expect("init");
        let next = store
            .set_state("a", StatePatch::new().selected(true), false)
            .expect("set");
        assert!(next.is_selected);
        assert!(next.last_modified >= created.last_modified);
        assert_eq!(store.history().len(), 2);

        store
            .set_state("a", StatePatch::new().dragging(true), true)
            .expect("set");
        assert_eq!(store.history().len(), 2);
    }

    #[test]
    fn invalid_patch_leaves_store_unchanged() {
        let mut store = store();
        store.initialize_state(section("a")).expect("init");
        let before = store.get_state("a").cloned();
        let err = store
            .set_state("a", StatePatch::new().children(vec!["ghost".into()]), false)
            .unwrap_err();
        assert!(err.report().expect("report").has_code(ValidationCode::InvalidChild));
        assert_eq!(store.get_state("a").cloned(), before);
    }

    #[test]
    fn update_props_merges_or_replaces() {
        let mut store = store();
        store
            .initialize_state(section("a").with_prop("title", json!("Hi")))
            .expect("init");

        let mut extra = Map::new();
        extra.insert("align".into(), json!("left"));
        let merged = store.update_props("a", extra.clone(), true).expect("merge");
        assert_eq!(merged.props.len(), 2);

        let replaced = store.update_props("a", extra, false).expect("replace");
        assert_eq!(replaced.props.len(), 1);
        assert!(replaced.props.get("title").is_none());
    }

    #[test]
    fn subscribers_see_new_and_previous() {
        let mut store = store();
        store.initialize_state(section("a")).expect("init");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = store.subscribe("a", move |next, prev| {
            sink.lock()
                .expect("lock")
                .push((prev.is_selected, next.is_selected));
            Ok(())
        });

        store
            .set_state("a", StatePatch::new().selected(true), false)
            .expect("set");
        assert!(store.unsubscribe("a", sub));
        assert!(!store.unsubscribe("a", sub));
        store
            .set_state("a", StatePatch::new().selected(false), false)
            .expect("set");

        assert_eq!(*seen.lock().expect("lock"), vec![(false, true)]);
    }

    #[test]
    fn failing_subscriber_does_not_block_commit() {
        let mut store = store();
        store.initialize_state(section("a")).expect("init");
        store.subscribe("a", |_, _| anyhow::bail!("nope"));
        store.subscribe("a", |_, _| panic!("boom"));
        let next = store
            .set_state("a", StatePatch::new().visible(false), false)
            .expect("set");
        assert!(!next.is_visible);
    }

    #[test]
    fn subscribers_run_before_state_changed() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let event_log = Arc::clone(&log);
        bus.subscribe(
            events::STATE_CHANGED,
            move |_| {
                event_log.lock().expect("lock").push("event");
                Ok(())
            },
            SubscribeOptions::default(),
        )
        .expect("subscribe");

        let mut store = StateStore::new(bus);
        store.initialize_state(section("a")).expect("init");
        let sub_log = Arc::clone(&log);
        store.subscribe("a", move |_, _| {
            sub_log.lock().expect("lock").push("subscriber");
            Ok(())
        });
        store
            .set_state("a", StatePatch::new().selected(true), false)
            .expect("set");

        assert_eq!(*log.lock().expect("lock"), vec!["subscriber", "event"]);
        assert_eq!(store.history().len(), 2);
    }

    #[test]
    fn state_changed_event_carries_diff() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.subscribe(
            events::STATE_CHANGED,
            move |event| {
                sink.lock().expect("lock").push(event.clone());
                Ok(())
            },
            SubscribeOptions::default(),
        )
        .expect("subscribe");

        let mut store = StateStore::new(bus);
        store.initialize_state(section("a")).expect("init");
        store
            .set_state("a", StatePatch::new().selected(true), false)
            .expect("set");

        let events = seen.lock().expect("lock");
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.source, "state-store");
        assert_eq!(event.get_str("componentId"), Some("a"));
        let changes = event.get("changes").expect("changes");
        assert_eq!(changes["isSelected"]["to"], json!(true));
        assert!(changes.get("lastModified").is_none());
    }
}
