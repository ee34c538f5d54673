//! Event bus error types.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced to callers of the bus.
///
/// Listener, filter and middleware failures are not represented here; they
/// are isolated and reported through [`crate::DeliveryReport`].
#[derive(Debug, Error)]
pub enum BusError {
    /// A registration call was malformed (for example an empty event type).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An event was published without a type.
    #[error("event is missing a type")]
    MissingEventType,

    /// `wait_for` expired before a matching event arrived.
    #[error("timed out after {timeout:?} waiting for '{event_type}'")]
    Timeout {
        event_type: String,
        timeout: Duration,
    },

    /// The temporary listener behind `wait_for` was dropped (for example by
    /// [`crate::EventBus::clear`]) before a matching event arrived.
    #[error("wait for '{0}' was aborted")]
    WaitAborted(String),
}

pub type Result<T> = std::result::Result<T, BusError>;
