//! Event bus for the block builder.
//!
//! The [`EventBus`] decouples producers and consumers of domain events.
//! Delivery is ordered, filterable and fault isolated:
//!
//! ```text
//! publish ──► filters ──► bounded FIFO queue ──► drain loop
//!                                                   │
//!                                  middleware pipeline (veto / rewrite)
//!                                                   │
//!                               listeners by descending priority
//!                                                   │
//!                                    history ring + running metrics
//! ```
//!
//! # Error Handling
//!
//! Only malformed input fails a call: an empty or missing event type
//! ([`BusError::MissingEventType`], [`BusError::InvalidArgument`]). Failing
//! listeners, filters and middlewares are caught, logged and counted; they
//! never escape `publish` or `publish_sync`.
//!
//! # Example
//!
//! ```ignore
//! use blocks_events::{EventBus, EventDraft, SubscribeOptions};
//!
//! let bus = EventBus::new();
//! let sub = bus.subscribe("state:changed", |event| {
//!     println!("{} changed", event.payload["componentId"]);
//!     Ok(())
//! }, SubscribeOptions::default().with_priority(10))?;
//! bus.publish(EventDraft::new("state:changed").with_field("componentId", "a".into()))?;
//! sub.unsubscribe();
//! ```

mod bus;
mod error;
mod event;
mod namespace;
mod options;
mod pipeline;
mod report;
mod wait;

pub use bus::{EventBus, Handler, Subscription};
pub use error::{BusError, Result};
pub use event::{Event, EventDraft};
pub use namespace::NamespacedBus;
pub use options::{BusOptions, ListenerFilter, SubscribeOptions};
pub use pipeline::{EventFilter, Middleware, MiddlewareAction};
pub use report::{BusMetrics, DeliveryReport, ListenerOutcome, ListenerStatus};
