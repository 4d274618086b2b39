//! State shared between the audio thread and the control thread.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::context::ContextTree;
use crate::topology::Topology;

/// Topology plus the context tree.
///
/// Lock order: a recycling lock is always taken before the context tree
/// lock, and a source recycling before any destination recycling. The
/// context tree lock is held only for single lookups.
pub struct Shared {
    pub topology: Topology,
    contexts: Mutex<ContextTree>,
}

impl Shared {
    pub fn new(topology: Topology) -> Self {
        Self {
            topology,
            contexts: Mutex::new(ContextTree::new()),
        }
    }

    pub fn contexts(&self) -> MutexGuard<'_, ContextTree> {
        self.contexts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
