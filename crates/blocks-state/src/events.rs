//! Event types published by the store.

pub const STATE_INITIALIZED: &str = "state:initialized";
pub const STATE_CHANGED: &str = "state:changed";
pub const VALIDATION_FAILED: &str = "validation-failed";
pub const CHILD_ADDED: &str = "child:added";
pub const CHILD_REMOVED: &str = "child:removed";
pub const COMPONENT_MOVED: &str = "component:moved";
pub const STATE_REMOVED: &str = "state:removed";
pub const HISTORY_UNDO: &str = "history:undo";
pub const HISTORY_REDO: &str = "history:redo";
pub const STATE_IMPORTED: &str = "state:imported";

