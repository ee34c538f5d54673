//! Batched updates.
//!
//! Inside a batch, metadata recomputation is deferred: commits only remember
//! which ids need it. When the outermost scope closes, each remembered id is
//! recomputed once. The scope flushes from `Drop`, so early returns, `?` and
//! panics inside the batch still leave the metadata consistent.

use std::mem;
use std::ops::{Deref, DerefMut};

use tracing::debug;

use crate::store::StateStore;

/// An open batch. Derefs to the store; closing happens on drop.
#[derive(Debug)]
pub struct BatchScope<'a> {
    store: &'a mut StateStore,
}

impl Deref for BatchScope<'_> {
    type Target = StateStore;

    fn deref(&self) -> &StateStore {
        self.store
    }
}

impl DerefMut for BatchScope<'_> {
    fn deref_mut(&mut self) -> &mut StateStore {
        self.store
    }
}

impl Drop for BatchScope<'_> {
    fn drop(&mut self) {
        self.store.end_batch();
    }
}

impl StateStore {
    /// Open a batch scope.
    pub fn begin_batch(&mut self) -> BatchScope<'_> {
        self.batch_depth += 1;
        BatchScope { store: self }
    }

    /// Run `f` inside a batch scope.
    pub fn batch<T>(&mut self, f: impl FnOnce(&mut StateStore) -> T) -> T {
        let mut scope = self.begin_batch();
        f(&mut scope)
    }

    pub fn is_batching(&self) -> bool {
        self.batch_depth > 0
    }

    fn end_batch(&mut self) {
        self.batch_depth = self.batch_depth.saturating_sub(1);
        if self.batch_depth > 0 {
            return;
        }
        let touched = mem::take(&mut self.batch_touched);
        let count = touched.len();
        for id in touched {
            if self.contains(&id) {
                self.refresh_subtree(&id);
            }
        }
        debug!(components = count, "Batch flushed");
    }
}
