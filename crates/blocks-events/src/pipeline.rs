//! Filter and middleware stages run before listener dispatch.
//!
//! Filters decide whether an event is accepted at all (they run on publish).
//! Middlewares run once per event when it is dispatched, in registration
//! order, and may veto or rewrite it. A stage that fails is logged and
//! skipped; it never stops the event on its own.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::event::Event;

/// What a middleware decided for an event.
#[derive(Debug, Clone, PartialEq)]
pub enum MiddlewareAction {
    /// Pass the event on unchanged.
    Continue,
    /// Drop the event for every listener.
    Cancel,
    /// Merge these keys into the event, then continue.
    Merge(Map<String, Value>),
}

/// A pipeline stage that may inspect, rewrite or veto an event.
pub trait Middleware: Send + Sync {
    /// Inspect the event and decide what happens to it.
    fn handle(&self, event: &Event) -> anyhow::Result<MiddlewareAction>;

    /// Name used in logs.
    fn name(&self) -> &str {
        "middleware"
    }
}

impl<F> Middleware for F
where
    F: Fn(&Event) -> anyhow::Result<MiddlewareAction> + Send + Sync,
{
    fn handle(&self, event: &Event) -> anyhow::Result<MiddlewareAction> {
        self(event)
    }
}

/// Publish-time predicate. Returning `Ok(false)` drops the event.
pub trait EventFilter: Send + Sync {
    fn allows(&self, event: &Event) -> anyhow::Result<bool>;

    fn name(&self) -> &str {
        "filter"
    }
}

impl<F> EventFilter for F
where
    F: Fn(&Event) -> anyhow::Result<bool> + Send + Sync,
{
    fn allows(&self, event: &Event) -> anyhow::Result<bool> {
        self(event)
    }
}

/// Render a panic payload for logs and reports.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic".to_string()
    }
}

/// Run every filter; any explicit `false` rejects the event.
///
/// A filter that errors or panics counts as "allow".
pub(crate) fn run_filters(filters: &[Arc<dyn EventFilter>], event: &Event) -> bool {
    for filter in filters {
        match catch_unwind(AssertUnwindSafe(|| filter.allows(event))) {
            Ok(Ok(true)) => {}
            Ok(Ok(false)) => {
                debug!(
                    event_type = %event.event_type,
                    filter = filter.name(),
                    "Event dropped by filter"
                );
                return false;
            }
            Ok(Err(error)) => {
                warn!(
                    event_type = %event.event_type,
                    filter = filter.name(),
                    %error,
                    "Event filter failed; allowing event"
                );
            }
            Err(payload) => {
                warn!(
                    event_type = %event.event_type,
                    filter = filter.name(),
                    panic = %panic_message(payload.as_ref()),
                    "Event filter panicked; allowing event"
                );
            }
        }
    }
    true
}

/// Run the middleware pipeline. Returns `None` when a middleware cancelled
/// the event.
pub(crate) fn run_middlewares(
    middlewares: &[Arc<dyn Middleware>],
    mut event: Event,
) -> Option<Event> {
    for middleware in middlewares {
        match catch_unwind(AssertUnwindSafe(|| middleware.handle(&event))) {
            Ok(Ok(MiddlewareAction::Continue)) => {}
            Ok(Ok(MiddlewareAction::Cancel)) => {
                debug!(
                    event_type = %event.event_type,
                    middleware = middleware.name(),
                    "Event cancelled by middleware"
                );
                return None;
            }
            Ok(Ok(MiddlewareAction::Merge(changes))) => merge_into(&mut event, changes),
            Ok(Err(error)) => {
                warn!(
                    event_type = %event.event_type,
                    middleware = middleware.name(),
                    %error,
                    "Middleware failed; continuing with unmodified event"
                );
            }
            Err(payload) => {
                warn!(
                    event_type = %event.event_type,
                    middleware = middleware.name(),
                    panic = %panic_message(payload.as_ref()),
                    "Middleware panicked; continuing with unmodified event"
                );
            }
        }
    }
    Some(event)
}

/// Apply a middleware rewrite. `type`, `id` and `timestamp` are fixed once
/// the event is enqueued.
fn merge_into(event: &mut Event, changes: Map<String, Value>) {
    for (key, value) in changes {
        match key.as_str() {
            "source" => match value {
                Value::String(source) => event.source = source,
                other => debug!(value = %other, "Ignoring non-string source rewrite"),
            },
            "propagate" => match value {
                Value::Bool(propagate) => event.propagate = propagate,
                other => debug!(value = %other, "Ignoring non-boolean propagate rewrite"),
            },
            "type" | "id" | "timestamp" => {
                debug!(
                    event_type = %event.event_type,
                    field = %key,
                    "Ignoring middleware rewrite of immutable event field"
                );
            }
            _ => {
                event.payload.insert(key, value);
            }
        }
    }
}
