//! EventBus - ordered, filterable publish/subscribe hub.
//!
//! # Delivery Order
//!
//! Listeners for a type are kept sorted by descending priority; listeners
//! with equal priority run in registration order. Queued events are drained
//! strictly one at a time: event n+1 is not dequeued until event n has been
//! through the middleware pipeline and every listener. A listener that
//! publishes while it runs only enqueues; the outer drain loop picks the new
//! event up afterwards. [`EventBus::publish_sync`] bypasses the queue.
//!
//! # Thread Safety
//!
//! `EventBus` is a cheap `Clone` handle over shared state guarded by a
//! mutex. The lock is never held while user code (listeners, filters,
//! middlewares) runs.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;

use tracing::{debug, warn};

use crate::error::{BusError, Result};
use crate::event::{Event, EventDraft};
use crate::options::{BusOptions, ListenerFilter, SubscribeOptions};
use crate::pipeline::{self, EventFilter, Middleware, panic_message};
use crate::report::{BusMetrics, DeliveryReport, ListenerOutcome, ListenerStatus};

/// Listener callback. Returning `Err` marks the delivery as failed without
/// affecting other listeners.
pub type Handler = Arc<dyn Fn(&Event) -> anyhow::Result<()> + Send + Sync>;

struct Listener {
    id: u64,
    priority: i32,
    once: bool,
    context: Option<String>,
    filter: Option<ListenerFilter>,
    handler: Handler,
    fired: AtomicBool,
}

#[derive(Default)]
struct BusState {
    listeners: HashMap<String, Vec<Arc<Listener>>>,
    middlewares: Vec<Arc<dyn Middleware>>,
    filters: Vec<Arc<dyn EventFilter>>,
    queue: VecDeque<Event>,
    processing: bool,
    history: VecDeque<DeliveryReport>,
    metrics: BusMetrics,
    next_listener_id: u64,
}

pub(crate) struct Shared {
    options: BusOptions,
    state: Mutex<BusState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove_listener(&self, event_type: &str, listener_id: u64) -> bool {
        let mut state = self.lock();
        let Some(bucket) = state.listeners.get_mut(event_type) else {
            return false;
        };
        let before = bucket.len();
        bucket.retain(|listener| listener.id != listener_id);
        let removed = bucket.len() != before;
        if bucket.is_empty() {
            state.listeners.remove(event_type);
        }
        removed
    }
}

/// Handle returned by [`EventBus::subscribe`]; the unsubscribe capability.
///
/// Dropping the handle does not unsubscribe.
#[derive(Debug, Clone)]
pub struct Subscription {
    shared: Weak<Shared>,
    event_type: String,
    listener_id: u64,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.listener_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Remove the listener. Returns false when it was already gone.
    pub fn unsubscribe(&self) -> bool {
        self.shared
            .upgrade()
            .is_some_and(|shared| shared.remove_listener(&self.event_type, self.listener_id))
    }
}

/// Event bus - routes events from publishers to prioritized listeners.
///
/// The bus is responsible for:
/// - Registering/unregistering listeners per event type
/// - Filtering and queueing published events
/// - Running the middleware pipeline once per event
/// - Isolating listener failures and recording delivery history/metrics
#[derive(Clone)]
pub struct EventBus {
    shared: Arc<Shared>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("EventBus")
            .field("options", &self.shared.options)
            .field("event_types", &state.listeners.len())
            .field("queued", &state.queue.len())
            .field("processing", &state.processing)
            .finish()
    }
}

impl EventBus {
    /// Create a bus with default options.
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(BusOptions::default())
    }

    #[must_use]
    pub fn with_options(options: BusOptions) -> Self {
        Self {
            shared: Arc::new(Shared {
                options,
                state: Mutex::new(BusState::default()),
            }),
        }
    }

    pub fn options(&self) -> &BusOptions {
        &self.shared.options
    }

    /// Register a listener for `event_type`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::InvalidArgument`] if `event_type` is empty.
    pub fn subscribe<F>(
        &self,
        event_type: impl Into<String>,
        handler: F,
        options: SubscribeOptions,
    ) -> Result<Subscription>
    where
        F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe_handler(event_type.into(), Arc::new(handler), options)
    }

    /// Register a listener that unregisters itself after its first call.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::InvalidArgument`] if `event_type` is empty.
    pub fn once<F>(&self, event_type: impl Into<String>, handler: F) -> Result<Subscription>
    where
        F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe(event_type, handler, SubscribeOptions::default().once())
    }

    /// Register an already shared handler.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::InvalidArgument`] if `event_type` is empty.
    pub fn subscribe_handler(
        &self,
        event_type: String,
        handler: Handler,
        options: SubscribeOptions,
    ) -> Result<Subscription> {
        if event_type.trim().is_empty() {
            return Err(BusError::InvalidArgument(
                "event type must not be empty".to_string(),
            ));
        }

        let mut state = self.shared.lock();
        state.next_listener_id += 1;
        let listener = Arc::new(Listener {
            id: state.next_listener_id,
            priority: options.priority,
            once: options.once,
            context: options.context,
            filter: options.filter,
            handler,
            fired: AtomicBool::new(false),
        });
        let listener_id = listener.id;

        let bucket = state.listeners.entry(event_type.clone()).or_default();
        // First slot whose priority is strictly lower keeps ties in
        // registration order.
        let position = bucket
            .iter()
            .position(|existing| existing.priority < listener.priority)
            .unwrap_or(bucket.len());
        bucket.insert(position, listener);

        debug!(event_type = %event_type, listener_id, "Listener registered");
        Ok(Subscription {
            shared: Arc::downgrade(&self.shared),
            event_type,
            listener_id,
        })
    }

    /// Remove a listener. Idempotent; returns whether one was removed.
    pub fn unsubscribe(&self, event_type: &str, listener_id: u64) -> bool {
        self.shared.remove_listener(event_type, listener_id)
    }

    /// Append a middleware to the pipeline (run in registration order).
    pub fn add_middleware<M>(&self, middleware: M)
    where
        M: Middleware + 'static,
    {
        self.shared.lock().middlewares.push(Arc::new(middleware));
    }

    /// Append a publish-time filter.
    pub fn add_filter<F>(&self, filter: F)
    where
        F: EventFilter + 'static,
    {
        self.shared.lock().filters.push(Arc::new(filter));
    }

    pub fn clear_middlewares(&self) {
        self.shared.lock().middlewares.clear();
    }

    pub fn clear_filters(&self) {
        self.shared.lock().filters.clear();
    }

    /// Publish an event through the queue.
    ///
    /// Returns `Ok(false)` when a filter dropped the event. With
    /// `auto_drain` enabled the queue is drained before returning unless a
    /// drain is already in flight (for example when called from a listener).
    ///
    /// # Errors
    ///
    /// Returns [`BusError::MissingEventType`] if the event has no type.
    pub fn publish(&self, draft: impl Into<EventDraft>) -> Result<bool> {
        let event = draft.into().normalize(&self.shared.options.default_source)?;
        if !self.accepts(&event) {
            return Ok(false);
        }

        {
            let mut state = self.shared.lock();
            state.metrics.total_events += 1;
            state.queue.push_back(event);
            let bound = self.shared.options.max_queue_size.max(1);
            while state.queue.len() > bound {
                if let Some(evicted) = state.queue.pop_front() {
                    state.metrics.evicted_events += 1;
                    warn!(
                        event_type = %evicted.event_type,
                        event_id = %evicted.id,
                        max_queue_size = bound,
                        "Event queue full; evicted oldest event"
                    );
                }
            }
        }

        if self.shared.options.auto_drain {
            self.drain();
        }
        Ok(true)
    }

    /// Publish and process immediately, ahead of anything still queued.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::MissingEventType`] if the event has no type.
    pub fn publish_sync(&self, draft: impl Into<EventDraft>) -> Result<DeliveryReport> {
        let event = draft.into().normalize(&self.shared.options.default_source)?;
        if !self.accepts(&event) {
            return Ok(DeliveryReport::filtered(event));
        }
        self.shared.lock().metrics.total_events += 1;
        Ok(self.process(event))
    }

    /// Drain the queue. Returns the number of events processed by this call
    /// (zero when another drain is already in flight).
    pub fn drain(&self) -> usize {
        {
            let mut state = self.shared.lock();
            if state.processing {
                return 0;
            }
            state.processing = true;
        }
        let mut guard = DrainGuard {
            shared: &self.shared,
            armed: true,
        };

        let mut processed = 0;
        loop {
            let next = {
                let mut state = self.shared.lock();
                let next = state.queue.pop_front();
                if next.is_none() {
                    // Cleared under the same lock that saw the empty queue so
                    // a concurrent publish cannot strand its event.
                    state.processing = false;
                    guard.armed = false;
                }
                next
            };
            match next {
                Some(event) => {
                    self.process(event);
                    processed += 1;
                }
                None => break,
            }
        }
        processed
    }

    fn accepts(&self, event: &Event) -> bool {
        let filters = self.shared.lock().filters.clone();
        if pipeline::run_filters(&filters, event) {
            true
        } else {
            self.shared.lock().metrics.dropped_events += 1;
            false
        }
    }

    fn process(&self, event: Event) -> DeliveryReport {
        let started = Instant::now();
        let middlewares = self.shared.lock().middlewares.clone();
        let original = event.clone();

        let Some(event) = pipeline::run_middlewares(&middlewares, event) else {
            let report = DeliveryReport {
                event: original,
                outcomes: Vec::new(),
                success: true,
                cancelled: true,
                filtered: false,
                duration: started.elapsed(),
            };
            self.record(&report);
            return report;
        };

        let listeners = self
            .shared
            .lock()
            .listeners
            .get(&event.event_type)
            .cloned()
            .unwrap_or_default();

        let mut outcomes = Vec::with_capacity(listeners.len());
        for listener in listeners {
            if listener.once && listener.fired.load(Ordering::SeqCst) {
                continue;
            }
            if !self.listener_accepts(&listener, &event) {
                outcomes.push(ListenerOutcome {
                    listener_id: listener.id,
                    context: listener.context.clone(),
                    status: ListenerStatus::Skipped,
                });
                continue;
            }
            if listener.once && listener.fired.swap(true, Ordering::SeqCst) {
                continue;
            }

            let status = invoke(&listener, &event);
            if listener.once {
                self.shared.remove_listener(&event.event_type, listener.id);
            }
            let delivered = status == ListenerStatus::Delivered;
            outcomes.push(ListenerOutcome {
                listener_id: listener.id,
                context: listener.context.clone(),
                status,
            });
            if delivered && !event.propagate {
                debug!(
                    event_type = %event.event_type,
                    listener_id = listener.id,
                    "Propagation stopped"
                );
                break;
            }
        }

        let success = !outcomes.iter().any(ListenerOutcome::is_failure);
        let report = DeliveryReport {
            event,
            outcomes,
            success,
            cancelled: false,
            filtered: false,
            duration: started.elapsed(),
        };
        self.record(&report);
        report
    }

    fn listener_accepts(&self, listener: &Listener, event: &Event) -> bool {
        let Some(filter) = &listener.filter else {
            return true;
        };
        match catch_unwind(AssertUnwindSafe(|| filter(event))) {
            Ok(accepted) => accepted,
            Err(payload) => {
                warn!(
                    event_type = %event.event_type,
                    listener_id = listener.id,
                    panic = %panic_message(payload.as_ref()),
                    "Listener filter panicked; skipping listener"
                );
                false
            }
        }
    }

    fn record(&self, report: &DeliveryReport) {
        let mut state = self.shared.lock();
        state.metrics.record(report);
        let limit = self.shared.options.max_history;
        if limit == 0 {
            return;
        }
        state.history.push_back(report.clone());
        while state.history.len() > limit {
            state.history.pop_front();
        }
    }

    /// Delivery reports, oldest first.
    pub fn history(&self) -> Vec<DeliveryReport> {
        self.shared.lock().history.iter().cloned().collect()
    }

    /// Delivery reports for one event type, oldest first.
    pub fn history_for(&self, event_type: &str) -> Vec<DeliveryReport> {
        self.shared
            .lock()
            .history
            .iter()
            .filter(|report| report.event.event_type == event_type)
            .cloned()
            .collect()
    }

    pub fn clear_history(&self) {
        self.shared.lock().history.clear();
    }

    pub fn metrics(&self) -> BusMetrics {
        self.shared.lock().metrics.clone()
    }

    pub fn reset_metrics(&self) {
        self.shared.lock().metrics = BusMetrics::default();
    }

    pub fn listener_count(&self, event_type: &str) -> usize {
        self.shared
            .lock()
            .listeners
            .get(event_type)
            .map_or(0, Vec::len)
    }

    /// Event types with at least one listener, sorted.
    pub fn event_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.shared.lock().listeners.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn queue_len(&self) -> usize {
        self.shared.lock().queue.len()
    }

    pub fn is_processing(&self) -> bool {
        self.shared.lock().processing
    }

    /// Tear the bus down: drop every listener, middleware, filter, queued
    /// event and history entry, and reset metrics.
    pub fn clear(&self) {
        let mut state = self.shared.lock();
        state.listeners.clear();
        state.middlewares.clear();
        state.filters.clear();
        state.queue.clear();
        state.history.clear();
        state.metrics = BusMetrics::default();
    }
}

/// Resets the processing flag if a drain unwinds.
struct DrainGuard<'a> {
    shared: &'a Shared,
    armed: bool,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.shared.lock().processing = false;
        }
    }
}

fn invoke(listener: &Listener, event: &Event) -> ListenerStatus {
    match catch_unwind(AssertUnwindSafe(|| (listener.handler)(event))) {
        Ok(Ok(())) => ListenerStatus::Delivered,
        Ok(Err(error)) => {
            warn!(
                event_type = %event.event_type,
                listener_id = listener.id,
                context = listener.context.as_deref().unwrap_or(""),
                %error,
                "Listener failed"
            );
            ListenerStatus::Failed {
                error: error.to_string(),
            }
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!(
                event_type = %event.event_type,
                listener_id = listener.id,
                context = listener.context.as_deref().unwrap_or(""),
                panic = %message,
                "Listener panicked"
            );
            ListenerStatus::Failed { error: message }
        }
    }
}
