//! Per-scope processors and the engine tick.

use std::sync::Arc;

use tracing::{debug, error, trace, warn};
use vx_ir::{CopyMode, Presets, SampleBuffer, SoundScope, Span};

use crate::clock::Clock;
use crate::context::RecallId;
use crate::event_queue::{EventQueue, VoiceEvent, VoiceEventKind};
use crate::port::Port;
use crate::recall::{RecallError, RecallGraph, Template, TemplateId};
use crate::routing::retire;
use crate::shared::Shared;
use crate::step::{run_instance, StepEnv};
use crate::task_launcher::TaskLauncher;
use crate::topology::{ChannelId, Direction, RecyclingId, Topology};
use crate::voice::{Voice, VoiceSpec};

/// Errors from starting voices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    Recall(RecallError),
    UnknownAudio,
    /// Channel missing, not an input, or not on the voice's audio.
    UnknownChannel,
    /// The audio does not take part in this scope.
    MissingAbility(SoundScope),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Recall(e) => write!(f, "Recall error: {}", e),
            EngineError::UnknownAudio => write!(f, "Unknown audio"),
            EngineError::UnknownChannel => write!(f, "Unknown or invalid input channel"),
            EngineError::MissingAbility(scope) => {
                write!(f, "Audio has no {} ability", scope.name())
            }
        }
    }
}

impl std::error::Error for EngineError {}

impl From<RecallError> for EngineError {
    fn from(e: RecallError) -> Self {
        EngineError::Recall(e)
    }
}

/// Runtime state of one sound scope: its recall graph, its voices and the
/// playback root context every voice context hangs off.
pub struct ScopeProcessor {
    scope: SoundScope,
    graph: RecallGraph,
    root: RecallId,
    voices: Vec<Voice>,
    ending: Vec<RecallId>,
    next_voice: u64,
}

impl ScopeProcessor {
    pub fn new(scope: SoundScope, shared: &Shared) -> Self {
        let recyclings = shared.topology.shared_recyclings();
        let context = shared.contexts().create(&recyclings);
        Self {
            scope,
            graph: RecallGraph::new(scope),
            root: RecallId {
                id: 0,
                context,
                scope,
            },
            voices: Vec::new(),
            ending: Vec::new(),
            next_voice: 0,
        }
    }

    pub fn scope(&self) -> SoundScope {
        self.scope
    }

    pub fn graph(&self) -> &RecallGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut RecallGraph {
        &mut self.graph
    }

    /// The playback root voice.
    pub fn root(&self) -> RecallId {
        self.root
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    pub fn voice(&self, tag: u64) -> Option<&Voice> {
        self.voices.iter().find(|v| v.tag == tag)
    }

    /// Register a template.
    ///
    /// Templates on shared channels (outputs, linked inputs, master inputs)
    /// get a persistent instance for the playback root right away, which
    /// carries mixed signals on to the next audio. Everything else waits for
    /// a voice.
    pub fn add_template(&mut self, shared: &Shared, template: Arc<Template>) -> TemplateId {
        let id = self.graph.add_template(template.clone());
        let on_shared = template
            .channel
            .is_some_and(|c| shared.topology.is_shared(c));
        let able = shared
            .topology
            .audio(template.audio)
            .is_some_and(|a| a.flags.has_ability(self.scope));
        if !(on_shared && able) {
            return id;
        }
        let created = {
            let mut contexts = shared.contexts();
            self.graph.duplicate(id, self.root, &mut contexts)
        };
        let instance = match created {
            Ok(dup) => dup.instance(),
            Err(e) => {
                warn!(scope = self.scope.name(), recall = %template.name, error = %e, "root duplication failed");
                None
            }
        };
        if let Some(instance) = instance {
            if let Some(inst) = self.graph.instance_mut(instance) {
                inst.status.persistent = true;
            }
            if let Err(e) = self.graph.resolve_dependencies(instance) {
                warn!(scope = self.scope.name(), recall = %template.name, error = %e, "root dependencies unresolved");
            }
        }
        id
    }

    /// Start a voice on input channels of one audio.
    ///
    /// `attack` is in samples of the audio's own samplerate.
    pub fn start_voice(
        &mut self,
        shared: &Shared,
        spec: VoiceSpec,
        attack: usize,
    ) -> Result<RecallId, EngineError> {
        let topology = &shared.topology;
        let audio = topology.audio(spec.audio).ok_or(EngineError::UnknownAudio)?;
        if !audio.flags.has_ability(self.scope) {
            return Err(EngineError::MissingAbility(self.scope));
        }
        let valid = spec.channels.iter().all(|&c| {
            topology
                .channel(c)
                .is_some_and(|ch| ch.audio == spec.audio && ch.direction == Direction::Input)
        });
        if !valid {
            return Err(EngineError::UnknownChannel);
        }

        let mut recyclings: Vec<RecyclingId> = Vec::new();
        for &channel in &spec.channels {
            for r in topology
                .recyclings_of(channel)
                .iter()
                .copied()
                .chain(topology.destination_recyclings(channel))
            {
                if !recyclings.contains(&r) {
                    recyclings.push(r);
                }
            }
        }
        let context = {
            let mut contexts = shared.contexts();
            let context = contexts.create(&recyclings);
            contexts.add_child(self.root.context, context);
            context
        };
        self.next_voice += 1;
        let recall_id = RecallId {
            id: self.next_voice,
            context,
            scope: self.scope,
        };

        for &channel in &spec.channels {
            for &rec_id in topology.recyclings_of(channel) {
                let Some(mut rec) = topology.lock(rec_id) else {
                    continue;
                };
                let mut signal = rec.template.instantiate(self.scope, context, attack);
                if let Some(samples) = &spec.samples {
                    signal.load_normalized(samples);
                }
                rec.add(signal);
                shared.contexts().retain(context);
            }
        }

        let templates: Vec<TemplateId> = self
            .graph
            .templates()
            .filter(|(_, t)| {
                t.audio == spec.audio && t.channel.map_or(true, |c| spec.channels.contains(&c))
            })
            .map(|(id, _)| id)
            .collect();
        {
            let mut contexts = shared.contexts();
            for template in templates {
                self.graph.duplicate(template, recall_id, &mut contexts)?;
            }
        }
        let instances = self.graph.instances_in(context);
        for &instance in &instances {
            self.graph.resolve_dependencies(instance)?;
        }
        debug!(
            scope = self.scope.name(),
            tag = spec.tag,
            voice = recall_id.id,
            instances = instances.len(),
            attack,
            "voice started"
        );
        self.voices.push(Voice {
            tag: spec.tag,
            recall_id,
            audio: spec.audio,
            channels: spec.channels,
            instances,
        });
        Ok(recall_id)
    }

    /// Cancel every instance of the voice tagged `tag`.
    pub fn stop_voice(&mut self, tag: u64) -> bool {
        let Some(voice) = self.voices.iter().find(|v| v.tag == tag) else {
            return false;
        };
        for instance in self.graph.instances_in(voice.recall_id.context) {
            if let Err(e) = self.graph.cancel(instance) {
                warn!(scope = self.scope.name(), tag, error = %e, "cancel failed");
            }
        }
        debug!(scope = self.scope.name(), tag, "voice stopped");
        true
    }

    /// Run every live instance once, in template registration order.
    pub fn process(&mut self, shared: &Shared) {
        let env = StepEnv {
            shared,
            scope: self.scope,
        };
        for id in self.graph.schedule() {
            if !self.graph.is_done(id) {
                run_instance(&mut self.graph, id, &env);
            }
        }
    }

    /// Add the master inputs' mix into `slot`, one interleaved pcm channel
    /// per master line, then advance them.
    pub fn write_sinks(&mut self, shared: &Shared, slot: &mut SampleBuffer, pcm_channels: usize) {
        for (line, channel) in shared.topology.sinks() {
            if line >= pcm_channels {
                continue;
            }
            for &rec_id in shared.topology.recyclings_of(channel) {
                let Some(mut rec) = shared.topology.lock(rec_id) else {
                    continue;
                };
                let Some(id) = rec.find_destination(self.scope) else {
                    continue;
                };
                let drained = match rec.get_mut(id) {
                    Some(signal) => {
                        if let Some(current) = signal.current() {
                            CopyMode::select(slot.format(), current.format()).copy(
                                slot,
                                Span::interleaved(line, pcm_channels),
                                current,
                                Span::at(0),
                                current.len(),
                            );
                        }
                        signal.advance();
                        signal.current().is_none()
                    }
                    None => false,
                };
                if drained {
                    retire(shared, &mut rec, id);
                }
            }
        }
    }

    fn has_signals(&self, shared: &Shared, channels: &[ChannelId], recall_id: RecallId) -> bool {
        channels.iter().any(|&c| {
            shared.topology.recyclings_of(c).iter().any(|&r| {
                shared
                    .topology
                    .lock(r)
                    .is_some_and(|rec| rec.has_context(self.scope, recall_id.context))
            })
        })
    }

    fn retire_signals(&self, shared: &Shared, channels: &[ChannelId], recall_id: RecallId) {
        for &channel in channels {
            for &rec_id in shared.topology.recyclings_of(channel) {
                if let Some(mut rec) = shared.topology.lock(rec_id) {
                    for id in rec.find_by_context(self.scope, recall_id.context) {
                        retire(shared, &mut rec, id);
                    }
                }
            }
        }
    }

    /// End voices whose streams ran out or whose top-level instances are
    /// done, remove finished instances, and release contexts nobody uses.
    ///
    /// Returns the tags of voices that went away.
    pub fn reap(&mut self, shared: &Shared) -> Vec<u64> {
        for voice in &self.voices {
            if self.ending.contains(&voice.recall_id) {
                continue;
            }
            let instances = self.graph.instances_in(voice.recall_id.context);
            let roots_done = instances.iter().all(|&i| {
                self.graph
                    .instance(i)
                    .map_or(true, |inst| inst.parent.is_some() || inst.status.done)
            });
            if roots_done || !self.has_signals(shared, &voice.channels, voice.recall_id) {
                self.ending.push(voice.recall_id);
            }
        }
        for &recall_id in &self.ending {
            for instance in self.graph.instances_in(recall_id.context) {
                if let Err(e) = self.graph.cancel(instance) {
                    warn!(scope = self.scope.name(), voice = recall_id.id, error = %e, "cancel failed");
                }
            }
        }
        let ending: Vec<Voice> = self
            .voices
            .iter()
            .filter(|v| self.ending.contains(&v.recall_id))
            .cloned()
            .collect();
        for voice in &ending {
            self.retire_signals(shared, &voice.channels, voice.recall_id);
        }

        {
            let mut contexts = shared.contexts();
            self.graph.reap(&mut contexts);
        }

        let mut finished = Vec::new();
        for voice in ending {
            if !self.graph.instances_in(voice.recall_id.context).is_empty() {
                continue;
            }
            let mut contexts = shared.contexts();
            contexts.finish(voice.recall_id.context);
            contexts.release(voice.recall_id.context);
            drop(contexts);
            self.ending.retain(|&r| r != voice.recall_id);
            self.voices.retain(|v| v.recall_id != voice.recall_id);
            debug!(scope = self.scope.name(), tag = voice.tag, "voice finished");
            finished.push(voice.tag);
        }
        shared.contexts().reap();
        finished
    }

    /// Log and discard the recall graph's life-cycle notifications.
    ///
    /// Returns how many there were.
    pub fn flush_events(&mut self) -> usize {
        let mut count = 0;
        while let Some(event) = self.graph.pop_event() {
            trace!(scope = self.scope.name(), ?event, "recall event");
            count += 1;
        }
        count
    }

    /// Cancel every instance, root included.
    pub fn cancel_all(&mut self) -> usize {
        let cancelled = self.graph.cancel_all();
        for voice in &self.voices {
            if !self.ending.contains(&voice.recall_id) {
                self.ending.push(voice.recall_id);
            }
        }
        cancelled
    }
}

/// The engine: shared topology, one processor per scope, the transport clock,
/// scheduled voice events and the task launcher feeding it.
pub struct Engine {
    shared: Arc<Shared>,
    presets: Presets,
    processors: [ScopeProcessor; SoundScope::COUNT],
    clock: Clock,
    events: EventQueue,
    launcher: Arc<TaskLauncher<Engine>>,
}

impl Engine {
    /// Freeze `topology` and build the per-scope processors.
    ///
    /// `presets` are the backend's: the clock runs at its samplerate and
    /// buffer size, and slots passed to [`tick`](Self::tick) have its layout.
    pub fn new(topology: Topology, presets: Presets, bpm: f64) -> Self {
        let shared = Arc::new(Shared::new(topology));
        let processors = SoundScope::ALL.map(|scope| ScopeProcessor::new(scope, &shared));
        Self {
            shared,
            presets,
            processors,
            clock: Clock::new(presets, bpm),
            events: EventQueue::new(),
            launcher: Arc::new(TaskLauncher::new()),
        }
    }

    pub fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    pub fn presets(&self) -> Presets {
        self.presets
    }

    pub fn launcher(&self) -> Arc<TaskLauncher<Engine>> {
        self.launcher.clone()
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut Clock {
        &mut self.clock
    }

    pub fn processor(&self, scope: SoundScope) -> &ScopeProcessor {
        &self.processors[scope.index()]
    }

    pub fn processor_mut(&mut self, scope: SoundScope) -> &mut ScopeProcessor {
        &mut self.processors[scope.index()]
    }

    /// Register a template with every scope. Returns its id, which is the
    /// same in every scope.
    pub fn add_template(&mut self, template: Template) -> TemplateId {
        let template = Arc::new(template);
        let shared = self.shared.clone();
        let [first, rest @ ..] = &mut self.processors;
        let id = first.add_template(&shared, template.clone());
        for processor in rest {
            processor.add_template(&shared, template.clone());
        }
        id
    }

    pub fn template(&self, id: TemplateId) -> Option<&Arc<Template>> {
        self.processors[0].graph().template(id)
    }

    /// A template's port, for control-side reads and writes.
    pub fn port(&self, id: TemplateId, name: &str) -> Option<Arc<Port>> {
        self.template(id)?.port(name).cloned()
    }

    pub fn schedule(&mut self, event: VoiceEvent) {
        self.events.push(event);
    }

    pub fn start_voice(
        &mut self,
        scope: SoundScope,
        spec: VoiceSpec,
        attack: usize,
    ) -> Result<RecallId, EngineError> {
        let shared = self.shared.clone();
        self.processors[scope.index()].start_voice(&shared, spec, attack)
    }

    pub fn stop_voice(&mut self, scope: SoundScope, tag: u64) -> bool {
        self.processors[scope.index()].stop_voice(tag)
    }

    pub fn active_voices(&self) -> usize {
        self.processors.iter().map(|p| p.voices().len()).sum()
    }

    fn fire(&mut self, event: VoiceEvent) {
        match event.kind {
            VoiceEventKind::Start(spec) => {
                let frames = self.clock.attack_for(event.time).unwrap_or(0);
                let rate = self
                    .shared
                    .topology
                    .audio(spec.audio)
                    .map_or(self.presets.samplerate, |a| a.presets.samplerate);
                let attack = if self.presets.samplerate == 0 {
                    0
                } else {
                    (frames as u64 * rate as u64 / self.presets.samplerate as u64) as usize
                };
                if let Err(e) = self.start_voice(event.scope, spec, attack) {
                    warn!(scope = event.scope.name(), error = %e, "voice start failed");
                }
            }
            VoiceEventKind::Stop { tag } => {
                self.stop_voice(event.scope, tag);
            }
        }
    }

    /// Produce one buffer into `slot`.
    ///
    /// Runs queued tasks, fires events due in this buffer, runs the scopes in
    /// fixed order, mixes the master lines into `slot` and reaps finished
    /// voices.
    pub fn tick(&mut self, slot: &mut SampleBuffer) {
        let launcher = self.launcher.clone();
        launcher.run(self);

        let due = self
            .events
            .drain_until_frame(self.clock.buffer_end(), self.clock.frames_per_tick());
        for index in due {
            if let Some(event) = self.events.get(index).cloned() {
                self.fire(event);
            }
        }
        self.events.compact();

        slot.silence();
        let shared = self.shared.clone();
        let pcm_channels = self.presets.pcm_channels as usize;
        for processor in &mut self.processors {
            processor.process(&shared);
            processor.write_sinks(&shared, slot, pcm_channels);
        }
        for processor in &mut self.processors {
            processor.reap(&shared);
            processor.flush_events();
        }
        self.clock.advance();
    }

    /// A slot-sized silent buffer in the backend's format.
    pub fn new_slot(&self) -> SampleBuffer {
        SampleBuffer::new(self.presets.format, self.presets.slot_len())
    }

    /// The backend consumed faster than we produced: every mix target
    /// resynchronizes before its next write.
    pub fn report_backlog(&mut self) {
        let topology = &self.shared.topology;
        for rec_id in topology.recycling_ids() {
            if let Some(mut rec) = topology.lock(rec_id) {
                for (_, signal) in rec.iter_mut() {
                    if signal.is_destination() {
                        signal.flags.backlog = true;
                    }
                }
            }
        }
        debug!("backlog reported");
    }

    /// The backend is gone: cancel everything rather than block.
    pub fn backend_failed(&mut self) {
        let cancelled: usize = self.processors.iter_mut().map(|p| p.cancel_all()).sum();
        error!(cancelled, "audio backend failed, all instances cancelled");
    }
}
