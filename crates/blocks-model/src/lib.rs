//! Data model for the block builder: component records, history entries,
//! snapshots and validation reports.
//!
//! Everything in this crate is plain data. Behaviour lives in
//! `blocks-state` (the store) and `blocks-events` (the bus).

pub mod error;
pub mod history;
pub mod ids;
pub mod record;
pub mod snapshot;
pub mod validation;

pub use error::{ModelError, Result};
pub use history::{HistoryEntry, ParentSlot};
pub use ids::new_component_id;
pub use record::{ComponentInit, ComponentMetadata, ComponentRecord, FieldChange, StatePatch};
pub use snapshot::StateSnapshot;
pub use validation::{IssueSeverity, ValidationCode, ValidationIssue, ValidationReport};
