//! Hierarchical component-state store with undo/redo.
//!
//! A [`StateStore`] owns a forest of [`ComponentRecord`]s keyed by id. Every
//! mutation is validated first, then committed, recorded in a bounded
//! history and announced on an [`EventBus`](blocks_events::EventBus):
//!
//! | Event               | Published by                                  |
//! |---------------------|-----------------------------------------------|
//! | `state:initialized` | `initialize_state`, `add_child` (new record)  |
//! | `state:changed`     | every committed record                        |
//! | `validation-failed` | any rejected change                           |
//! | `child:added`       | `add_child`                                   |
//! | `child:removed`     | `remove_child`                                |
//! | `component:moved`   | `move_component`                              |
//! | `state:removed`     | `remove_state`, `remove_subtree`              |
//! | `history:undo/redo` | `undo`, `redo`                                |
//! | `state:imported`    | `import_state`                                |
//!
//! Placement rules are delegated to an optional [`NestingPolicy`].

mod batch;
mod error;
pub mod events;
mod history;
pub mod metadata;
mod options;
mod policy;
mod snapshot;
mod store;
mod structure;
mod tree;
mod validation;

pub use batch::BatchScope;
pub use blocks_model::ComponentRecord;
pub use error::{Result, StateError};
pub use metadata::compute_depth;
pub use options::StoreOptions;
pub use policy::{NestingDecision, NestingPolicy};
pub use store::{StateCallback, StateStore, SubscriptionId};
pub use structure::ChildRef;
pub use tree::TreeNode;
