//! RecyclingContext tree and voice identifiers.
//!
//! A context lists the recyclings one playback invocation runs through.
//! Contexts nest: a voice context is a child of its scope's playback root.
//! Delivery from a source into a destination recycling is admitted only when
//! the destination belongs to the source's context or one of its descendants.

use std::collections::HashMap;

use slotmap::SlotMap;
use vx_ir::SoundScope;

use crate::topology::RecyclingId;

slotmap::new_key_type! {
    /// Handle to a [`RecyclingContext`].
    pub struct ContextId;
}

/// One node of the context tree.
#[derive(Clone, Debug, Default)]
pub struct RecyclingContext {
    pub parent: Option<ContextId>,
    pub children: Vec<ContextId>,
    pub recyclings: Vec<RecyclingId>,
    /// Outstanding references (voice id, instances, signals).
    pub refs: u32,
    /// The voice has ended; no new instances may be created against it.
    pub finished: bool,
}

/// Arena of contexts with a reverse index from recycling to contexts.
#[derive(Default)]
pub struct ContextTree {
    nodes: SlotMap<ContextId, RecyclingContext>,
    index: HashMap<RecyclingId, Vec<ContextId>>,
}

impl ContextTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a root context over `recyclings`, holding one reference.
    pub fn create(&mut self, recyclings: &[RecyclingId]) -> ContextId {
        let id = self.nodes.insert(RecyclingContext {
            recyclings: recyclings.to_vec(),
            refs: 1,
            ..Default::default()
        });
        for &r in recyclings {
            self.index.entry(r).or_default().push(id);
        }
        id
    }

    pub fn get(&self, id: ContextId) -> Option<&RecyclingContext> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: ContextId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Present and not finished.
    pub fn is_live(&self, id: ContextId) -> bool {
        self.nodes.get(id).is_some_and(|c| !c.finished)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Attach `child` under `parent`, detaching it from any previous parent.
    pub fn add_child(&mut self, parent: ContextId, child: ContextId) -> bool {
        if parent == child
            || !self.nodes.contains_key(parent)
            || !self.nodes.contains_key(child)
            || self.is_ancestor_or_self(child, parent)
        {
            return false;
        }
        if let Some(old) = self.nodes.get(child).and_then(|c| c.parent) {
            self.remove_child(old, child);
        }
        if let Some(p) = self.nodes.get_mut(parent) {
            p.children.push(child);
        }
        if let Some(c) = self.nodes.get_mut(child) {
            c.parent = Some(parent);
        }
        true
    }

    pub fn remove_child(&mut self, parent: ContextId, child: ContextId) -> bool {
        let Some(p) = self.nodes.get_mut(parent) else {
            return false;
        };
        let Some(pos) = p.children.iter().position(|&c| c == child) else {
            return false;
        };
        p.children.remove(pos);
        if let Some(c) = self.nodes.get_mut(child) {
            c.parent = None;
        }
        true
    }

    /// Position of `recycling` within `context`.
    pub fn find(&self, context: ContextId, recycling: RecyclingId) -> Option<usize> {
        self.nodes
            .get(context)?
            .recyclings
            .iter()
            .position(|&r| r == recycling)
    }

    /// Whether `recycling` participates in `ancestor` or any of its descendants.
    pub fn find_child(&self, ancestor: ContextId, recycling: RecyclingId) -> bool {
        self.index.get(&recycling).is_some_and(|holders| {
            holders
                .iter()
                .any(|&holder| self.is_ancestor_or_self(ancestor, holder))
        })
    }

    /// Nearest strict ancestor of `context` that contains `recycling`.
    pub fn find_parent(&self, context: ContextId, recycling: RecyclingId) -> Option<ContextId> {
        let mut current = self.nodes.get(context)?.parent;
        while let Some(id) = current {
            if self.find(id, recycling).is_some() {
                return Some(id);
            }
            current = self.nodes.get(id)?.parent;
        }
        None
    }

    /// Root of the tree `context` belongs to.
    pub fn toplevel(&self, context: ContextId) -> Option<ContextId> {
        let mut current = context;
        loop {
            match self.nodes.get(current)?.parent {
                Some(parent) => current = parent,
                None => return Some(current),
            }
        }
    }

    /// Whether `ancestor` is `context` or one of its ancestors.
    pub fn is_ancestor_or_self(&self, ancestor: ContextId, context: ContextId) -> bool {
        let mut current = Some(context);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.nodes.get(id).and_then(|c| c.parent);
        }
        false
    }

    /// Insert `recycling` at `position` (clamped) in `context`.
    pub fn insert(&mut self, context: ContextId, position: usize, recycling: RecyclingId) -> bool {
        let Some(node) = self.nodes.get_mut(context) else {
            return false;
        };
        if node.recyclings.contains(&recycling) {
            return false;
        }
        let at = position.min(node.recyclings.len());
        node.recyclings.insert(at, recycling);
        self.index.entry(recycling).or_default().push(context);
        true
    }

    /// Replace the recycling at `position`, returning the old one.
    pub fn replace(
        &mut self,
        context: ContextId,
        position: usize,
        recycling: RecyclingId,
    ) -> Option<RecyclingId> {
        let node = self.nodes.get_mut(context)?;
        let slot = node.recyclings.get_mut(position)?;
        let old = core::mem::replace(slot, recycling);
        self.unindex(old, context);
        self.index.entry(recycling).or_default().push(context);
        Some(old)
    }

    /// Remove `recycling` from `context`.
    pub fn remove(&mut self, context: ContextId, recycling: RecyclingId) -> bool {
        let Some(node) = self.nodes.get_mut(context) else {
            return false;
        };
        let Some(pos) = node.recyclings.iter().position(|&r| r == recycling) else {
            return false;
        };
        node.recyclings.remove(pos);
        self.unindex(recycling, context);
        true
    }

    fn unindex(&mut self, recycling: RecyclingId, context: ContextId) {
        if let Some(holders) = self.index.get_mut(&recycling) {
            holders.retain(|&c| c != context);
            if holders.is_empty() {
                self.index.remove(&recycling);
            }
        }
    }

    pub fn retain(&mut self, context: ContextId) {
        if let Some(c) = self.nodes.get_mut(context) {
            c.refs += 1;
        }
    }

    /// Drop one reference. Returns the remaining count.
    pub fn release(&mut self, context: ContextId) -> u32 {
        match self.nodes.get_mut(context) {
            Some(c) => {
                c.refs = c.refs.saturating_sub(1);
                c.refs
            }
            None => 0,
        }
    }

    /// Mark the voice of `context` as ended.
    pub fn finish(&mut self, context: ContextId) {
        if let Some(c) = self.nodes.get_mut(context) {
            c.finished = true;
        }
    }

    /// Destroy every unreferenced context without children.
    ///
    /// Repeats until stable so a parent freed by its last child goes too.
    pub fn reap(&mut self) -> Vec<ContextId> {
        let mut reaped = Vec::new();
        loop {
            let dead: Vec<ContextId> = self
                .nodes
                .iter()
                .filter(|(_, c)| c.refs == 0 && c.children.is_empty())
                .map(|(id, _)| id)
                .collect();
            if dead.is_empty() {
                break;
            }
            for id in dead {
                if let Some(parent) = self.nodes.get(id).and_then(|c| c.parent) {
                    self.remove_child(parent, id);
                }
                if let Some(node) = self.nodes.remove(id) {
                    for r in node.recyclings {
                        self.unindex(r, id);
                    }
                }
                reaped.push(id);
            }
        }
        reaped
    }
}

/// Identifies one voice: a context within a scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RecallId {
    pub id: u64,
    pub context: ContextId,
    pub scope: SoundScope,
}
