//! Recall templates and their per-voice runtime instances.
//!
//! A template is registered once per static topology and never runs. Each
//! voice gets its own instance of every template that applies to it, created
//! by [`RecallGraph::duplicate`]. There is at most one instance per
//! `(template, context)` pair; duplicating again returns the existing one.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use slotmap::SlotMap;
use tracing::debug;
use vx_ir::{RecallFlags, RecallKind, SoundScope};

use crate::context::{ContextId, ContextTree, RecallId};
use crate::plugin::{DspPlugin, PluginFactory};
use crate::port::Port;
use crate::topology::{AudioId, ChannelId};

/// Index of a template in registration order.
///
/// Templates are registered in the same order in every scope's graph, so one
/// id names the same template everywhere.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TemplateId(u32);

impl TemplateId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

slotmap::new_key_type! {
    /// Handle to a runtime instance.
    pub struct InstanceId;
}

/// Immutable description of a recall.
pub struct Template {
    pub name: String,
    pub kind: RecallKind,
    pub flags: RecallFlags,
    pub audio: AudioId,
    /// Channel the recall works on; `None` for audio-level recalls.
    pub channel: Option<ChannelId>,
    /// Container template whose instance owns this one.
    pub parent: Option<TemplateId>,
    /// Templates whose same-voice instances this one reads from.
    pub dependencies: Vec<TemplateId>,
    pub ports: Vec<Arc<Port>>,
    pub plugin: Option<PluginFactory>,
}

impl Template {
    pub fn new(name: &str, kind: RecallKind, audio: AudioId) -> Self {
        Self {
            name: name.into(),
            kind,
            flags: RecallFlags::default(),
            audio,
            channel: None,
            parent: None,
            dependencies: Vec::new(),
            ports: Vec::new(),
            plugin: None,
        }
    }

    pub fn on_channel(mut self, channel: ChannelId) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn with_flags(mut self, flags: RecallFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn child_of(mut self, parent: TemplateId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn depends_on(mut self, template: TemplateId) -> Self {
        self.dependencies.push(template);
        self
    }

    pub fn with_port(mut self, port: Port) -> Self {
        self.ports.push(Arc::new(port));
        self
    }

    pub fn with_plugin(mut self, factory: PluginFactory) -> Self {
        self.plugin = Some(factory);
        self
    }

    pub fn port(&self, name: &str) -> Option<&Arc<Port>> {
        self.ports.iter().find(|p| p.name() == name)
    }
}

/// Life-cycle flags of an instance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InstanceStatus {
    pub done: bool,
    pub cancelled: bool,
    pub persistent: bool,
}

/// Per-voice state a step function keeps between ticks.
pub enum InstanceData {
    None,
    Counter {
        ticks: u64,
    },
    Plugin {
        plugin: Box<dyn DspPlugin>,
        input: Vec<f32>,
        output: Vec<f32>,
    },
}

/// A per-voice duplicate of a template.
pub struct Instance {
    pub template: TemplateId,
    pub recall_id: RecallId,
    pub parent: Option<InstanceId>,
    pub children: Vec<InstanceId>,
    /// Same-voice instances of the template's dependencies, once resolved.
    pub dependencies: Vec<Option<InstanceId>>,
    pub status: InstanceStatus,
    pub data: InstanceData,
}

/// Notifications emitted by life-cycle transitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecallEvent {
    Done(InstanceId),
    Cancelled(InstanceId),
    Removed(InstanceId),
}

/// Result of a duplication request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Duplication {
    Created(InstanceId),
    Existing(InstanceId),
    /// The template is not duplicable for this scope.
    Skipped,
}

impl Duplication {
    pub fn instance(self) -> Option<InstanceId> {
        match self {
            Duplication::Created(id) | Duplication::Existing(id) => Some(id),
            Duplication::Skipped => None,
        }
    }
}

/// Errors from recall graph operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecallError {
    /// Context missing or already finished.
    InvalidContext,
    UnknownTemplate,
    UnknownInstance,
}

impl std::fmt::Display for RecallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecallError::InvalidContext => write!(f, "Recycling context is missing or finished"),
            RecallError::UnknownTemplate => write!(f, "Unknown recall template"),
            RecallError::UnknownInstance => write!(f, "Unknown recall instance"),
        }
    }
}

impl std::error::Error for RecallError {}

/// Templates and instances of one sound scope.
pub struct RecallGraph {
    scope: SoundScope,
    templates: Vec<Arc<Template>>,
    instances: SlotMap<InstanceId, Instance>,
    by_context: HashMap<(TemplateId, ContextId), InstanceId>,
    /// Instances of each template, in creation order.
    per_template: Vec<Vec<InstanceId>>,
    events: VecDeque<RecallEvent>,
}

impl RecallGraph {
    pub fn new(scope: SoundScope) -> Self {
        Self {
            scope,
            templates: Vec::new(),
            instances: SlotMap::with_key(),
            by_context: HashMap::new(),
            per_template: Vec::new(),
            events: VecDeque::new(),
        }
    }

    pub fn scope(&self) -> SoundScope {
        self.scope
    }

    pub fn add_template(&mut self, template: Arc<Template>) -> TemplateId {
        let id = TemplateId(self.templates.len() as u32);
        self.templates.push(template);
        self.per_template.push(Vec::new());
        id
    }

    pub fn template(&self, id: TemplateId) -> Option<&Arc<Template>> {
        self.templates.get(id.index())
    }

    pub fn templates(&self) -> impl Iterator<Item = (TemplateId, &Arc<Template>)> {
        self.templates
            .iter()
            .enumerate()
            .map(|(i, t)| (TemplateId(i as u32), t))
    }

    pub fn instance(&self, id: InstanceId) -> Option<&Instance> {
        self.instances.get(id)
    }

    pub fn instance_mut(&mut self, id: InstanceId) -> Option<&mut Instance> {
        self.instances.get_mut(id)
    }

    /// Template of an instance.
    pub fn template_of(&self, id: InstanceId) -> Option<&Arc<Template>> {
        self.instances
            .get(id)
            .and_then(|i| self.templates.get(i.template.index()))
    }

    pub fn find(&self, template: TemplateId, context: ContextId) -> Option<InstanceId> {
        self.by_context.get(&(template, context)).copied()
    }

    pub fn instances_of(&self, template: TemplateId) -> &[InstanceId] {
        self.per_template
            .get(template.index())
            .map_or(&[], Vec::as_slice)
    }

    /// Every instance created against `context`.
    pub fn instances_in(&self, context: ContextId) -> Vec<InstanceId> {
        self.instances
            .iter()
            .filter(|(_, i)| i.recall_id.context == context)
            .map(|(id, _)| id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn is_done(&self, id: InstanceId) -> bool {
        self.instances.get(id).is_some_and(|i| i.status.done)
    }

    /// Instances that still run, in template registration order.
    pub fn schedule(&self) -> Vec<InstanceId> {
        self.per_template
            .iter()
            .flatten()
            .copied()
            .filter(|&id| self.instances.get(id).is_some_and(|i| !i.status.done))
            .collect()
    }

    /// Return the instance of `template` for `recall_id`'s context, creating
    /// it (and its container parents) if needed.
    pub fn duplicate(
        &mut self,
        template: TemplateId,
        recall_id: RecallId,
        contexts: &mut ContextTree,
    ) -> Result<Duplication, RecallError> {
        let tmpl = self
            .templates
            .get(template.index())
            .cloned()
            .ok_or(RecallError::UnknownTemplate)?;
        if !tmpl.flags.duplicable_for(self.scope) {
            return Ok(Duplication::Skipped);
        }
        if !contexts.is_live(recall_id.context) {
            return Err(RecallError::InvalidContext);
        }
        if let Some(existing) = self.find(template, recall_id.context) {
            return Ok(Duplication::Existing(existing));
        }

        let parent = match tmpl.parent {
            Some(pt) => self.duplicate(pt, recall_id, contexts)?.instance(),
            None => None,
        };
        let data = match (tmpl.kind, &tmpl.plugin) {
            (RecallKind::Counter, _) => InstanceData::Counter { ticks: 0 },
            (RecallKind::Plugin, Some(factory)) => InstanceData::Plugin {
                plugin: factory(),
                input: Vec::new(),
                output: Vec::new(),
            },
            _ => InstanceData::None,
        };
        let id = self.instances.insert(Instance {
            template,
            recall_id,
            parent,
            children: Vec::new(),
            dependencies: vec![None; tmpl.dependencies.len()],
            status: InstanceStatus {
                persistent: tmpl.flags.persistent,
                ..Default::default()
            },
            data,
        });
        if let Some(p) = parent.and_then(|p| self.instances.get_mut(p)) {
            p.children.push(id);
        }
        self.by_context.insert((template, recall_id.context), id);
        if let Some(list) = self.per_template.get_mut(template.index()) {
            list.push(id);
        }
        contexts.retain(recall_id.context);
        debug!(scope = self.scope.name(), recall = %tmpl.name, voice = recall_id.id, "instance created");
        Ok(Duplication::Created(id))
    }

    /// Point an instance's dependencies at the same-voice instances of the
    /// templates it depends on. Returns how many are resolved.
    pub fn resolve_dependencies(&mut self, id: InstanceId) -> Result<usize, RecallError> {
        let inst = self.instances.get(id).ok_or(RecallError::UnknownInstance)?;
        let context = inst.recall_id.context;
        let deps = self
            .templates
            .get(inst.template.index())
            .map(|t| t.dependencies.clone())
            .unwrap_or_default();
        let resolved: Vec<Option<InstanceId>> =
            deps.iter().map(|&t| self.find(t, context)).collect();
        let count = resolved.iter().flatten().count();
        if let Some(inst) = self.instances.get_mut(id) {
            inst.dependencies = resolved;
        }
        Ok(count)
    }

    /// The `n`th resolved dependency of an instance.
    pub fn dependency(&self, id: InstanceId, n: usize) -> Option<InstanceId> {
        self.instances.get(id)?.dependencies.get(n).copied().flatten()
    }

    /// Mark an instance done.
    ///
    /// Returns whether the state changed. Persistent instances and instances
    /// already done are left alone.
    pub fn done(&mut self, id: InstanceId) -> Result<bool, RecallError> {
        let inst = self.instances.get_mut(id).ok_or(RecallError::UnknownInstance)?;
        if inst.status.persistent || inst.status.done {
            return Ok(false);
        }
        inst.status.done = true;
        let parent = inst.parent;
        self.events.push_back(RecallEvent::Done(id));
        debug!(scope = self.scope.name(), ?id, "instance done");
        if let Some(parent) = parent {
            self.propagate_done(parent)?;
        }
        Ok(true)
    }

    fn propagate_done(&mut self, parent: InstanceId) -> Result<(), RecallError> {
        let Some(p) = self.instances.get(parent) else {
            return Ok(());
        };
        let propagates = self
            .templates
            .get(p.template.index())
            .is_some_and(|t| t.flags.propagate_done);
        let all_done = p
            .children
            .iter()
            .all(|c| self.instances.get(*c).map_or(true, |c| c.status.done));
        if propagates && all_done {
            self.done(parent)?;
        }
        Ok(())
    }

    /// Cancel an instance and its children.
    ///
    /// Sets DONE and emits one `Cancelled` event. A persistent instance stays
    /// reachable until [`stop_persistent`](Self::stop_persistent).
    pub fn cancel(&mut self, id: InstanceId) -> Result<bool, RecallError> {
        let inst = self.instances.get_mut(id).ok_or(RecallError::UnknownInstance)?;
        if inst.status.cancelled {
            return Ok(false);
        }
        inst.status.cancelled = true;
        let was_done = core::mem::replace(&mut inst.status.done, true);
        let children = inst.children.clone();
        let parent = inst.parent;
        self.events.push_back(RecallEvent::Cancelled(id));
        debug!(scope = self.scope.name(), ?id, "instance cancelled");
        for child in children {
            self.cancel(child)?;
        }
        if let Some(parent) = parent.filter(|_| !was_done) {
            self.propagate_done(parent)?;
        }
        Ok(true)
    }

    /// Clear the persistence flag so a cancelled instance can be torn down.
    pub fn stop_persistent(&mut self, id: InstanceId) -> Result<bool, RecallError> {
        let inst = self.instances.get_mut(id).ok_or(RecallError::UnknownInstance)?;
        Ok(core::mem::replace(&mut inst.status.persistent, false))
    }

    /// Cancel every instance. Returns how many were newly cancelled.
    pub fn cancel_all(&mut self) -> usize {
        let ids: Vec<InstanceId> = self.instances.keys().collect();
        ids.into_iter()
            .filter(|&id| self.cancel(id).unwrap_or(false))
            .count()
    }

    /// Remove an instance and its subtree, detaching it from its parent.
    ///
    /// A propagating parent whose remaining children are all done becomes done.
    pub fn remove(&mut self, id: InstanceId, contexts: &mut ContextTree) -> Result<(), RecallError> {
        let parent = self
            .instances
            .get(id)
            .ok_or(RecallError::UnknownInstance)?
            .parent;
        self.remove_subtree(id, contexts);
        if let Some(parent) = parent {
            let Some(p) = self.instances.get_mut(parent) else {
                return Ok(());
            };
            p.children.retain(|&c| c != id);
            self.propagate_done(parent)?;
        }
        Ok(())
    }

    fn remove_subtree(&mut self, id: InstanceId, contexts: &mut ContextTree) {
        let Some(inst) = self.instances.remove(id) else {
            return;
        };
        for child in inst.children {
            self.remove_subtree(child, contexts);
        }
        self.by_context.remove(&(inst.template, inst.recall_id.context));
        if let Some(list) = self.per_template.get_mut(inst.template.index()) {
            list.retain(|&i| i != id);
        }
        contexts.release(inst.recall_id.context);
        self.events.push_back(RecallEvent::Removed(id));
    }

    /// Remove every finished, non-persistent instance without children.
    ///
    /// Children go first, so a parent is removed in a later round once it is
    /// a leaf.
    pub fn reap(&mut self, contexts: &mut ContextTree) -> Vec<InstanceId> {
        let mut reaped = Vec::new();
        loop {
            let dead: Vec<InstanceId> = self
                .instances
                .iter()
                .filter(|(_, i)| i.status.done && !i.status.persistent && i.children.is_empty())
                .map(|(id, _)| id)
                .collect();
            if dead.is_empty() {
                break;
            }
            for id in dead {
                if self.remove(id, contexts).is_ok() {
                    reaped.push(id);
                }
            }
        }
        reaped
    }

    pub fn drain_events(&mut self) -> Vec<RecallEvent> {
        self.events.drain(..).collect()
    }

    /// Oldest undelivered notification.
    pub fn pop_event(&mut self) -> Option<RecallEvent> {
        self.events.pop_front()
    }

    pub fn pending_events(&self) -> usize {
        self.events.len()
    }
}
