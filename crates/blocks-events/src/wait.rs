//! Awaiting the next event of a type.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::debug;

use crate::bus::EventBus;
use crate::error::{BusError, Result};
use crate::event::Event;
use crate::options::SubscribeOptions;

impl EventBus {
    /// Resolve with the next event of `event_type`, or fail after `timeout`.
    ///
    /// The temporary listener is removed on every path, so abandoned waits
    /// do not leak registrations.
    ///
    /// # Errors
    ///
    /// - [`BusError::Timeout`] if no matching event arrived in time.
    /// - [`BusError::WaitAborted`] if the listener was dropped first (for
    ///   example by [`EventBus::clear`]).
    /// - [`BusError::InvalidArgument`] if `event_type` is empty.
    pub async fn wait_for(&self, event_type: impl Into<String>, timeout: Duration) -> Result<Event> {
        let event_type = event_type.into();
        let (tx, rx) = oneshot::channel();
        let slot = Mutex::new(Some(tx));

        let subscription = self.subscribe(
            event_type.clone(),
            move |event: &Event| {
                let sender = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
                if let Some(sender) = sender {
                    // The waiter may already have timed out.
                    let _ = sender.send(event.clone());
                }
                Ok(())
            },
            SubscribeOptions::default()
                .once()
                .with_context(format!("wait_for:{event_type}")),
        )?;

        let outcome = tokio::time::timeout(timeout, rx).await;
        subscription.unsubscribe();

        match outcome {
            Ok(Ok(event)) => Ok(event),
            Ok(Err(_)) => Err(BusError::WaitAborted(event_type)),
            Err(_) => {
                debug!(event_type = %event_type, ?timeout, "wait_for timed out");
                Err(BusError::Timeout {
                    event_type,
                    timeout,
                })
            }
        }
    }
}
