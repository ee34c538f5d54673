//! Delivery reports and bus metrics.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::event::Event;

/// What happened when one listener saw one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ListenerStatus {
    Delivered,
    /// The listener's own filter declined the event.
    Skipped,
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerOutcome {
    pub listener_id: u64,
    pub context: Option<String>,
    #[serde(flatten)]
    pub status: ListenerStatus,
}

impl ListenerOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self.status, ListenerStatus::Failed { .. })
    }
}

/// Result of processing one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryReport {
    pub event: Event,
    pub outcomes: Vec<ListenerOutcome>,
    /// True when no listener failed.
    pub success: bool,
    /// A middleware vetoed the event; no listener ran.
    pub cancelled: bool,
    /// A publish filter dropped the event; it was never processed.
    pub filtered: bool,
    pub duration: Duration,
}

impl DeliveryReport {
    pub(crate) fn filtered(event: Event) -> Self {
        Self {
            event,
            outcomes: Vec::new(),
            success: false,
            cancelled: false,
            filtered: true,
            duration: Duration::ZERO,
        }
    }

    pub fn delivered_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.status == ListenerStatus::Delivered)
            .count()
    }

    pub fn failure_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.is_failure())
            .count()
    }
}

/// Rolling counters kept by the bus.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusMetrics {
    /// Events accepted by `publish` / `publish_sync`.
    pub total_events: u64,
    /// Events that went through the middleware pipeline.
    pub processed_events: u64,
    /// Processed events with at least one failing listener.
    pub failed_events: u64,
    /// Events rejected by a publish filter.
    pub dropped_events: u64,
    pub cancelled_events: u64,
    /// Queued events discarded because the queue was full.
    pub evicted_events: u64,
    pub listener_failures: u64,
    /// Arithmetic mean of per-event processing time.
    pub average_processing_time: Duration,
}

impl BusMetrics {
    pub(crate) fn record(&mut self, report: &DeliveryReport) {
        self.processed_events += 1;
        if report.cancelled {
            self.cancelled_events += 1;
        }
        if !report.success {
            self.failed_events += 1;
        }
        self.listener_failures += report.failure_count() as u64;

        let count = u128::from(self.processed_events);
        let total = self.average_processing_time.as_nanos() * (count - 1)
            + report.duration.as_nanos();
        let average = u64::try_from(total / count).unwrap_or(u64::MAX);
        self.average_processing_time = Duration::from_nanos(average);
    }
}
