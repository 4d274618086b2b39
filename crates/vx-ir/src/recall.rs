//! Recall descriptions: what kind of processing unit a recall is and what
//! capabilities it carries.

use crate::scope::{ScopeMask, SoundScope};

/// The processing a recall performs each tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecallKind {
    /// Groups child recalls; does no processing of its own.
    Container,
    /// Routes the current buffer of its signal to every admitted destination.
    Buffer,
    /// Drives a voice's stream through the channel and finishes when it is exhausted.
    Playback,
    /// Scales the current buffer by its `volume` port.
    Volume,
    /// Counts ticks towards a `length` port, then finishes.
    Counter,
    /// Ramps gain from its counter's progress. Depends on a `Counter`.
    Fade,
    /// Runs one DSP tick of an external plugin.
    Plugin,
}

impl RecallKind {
    pub const COUNT: usize = 7;

    pub const ALL: [RecallKind; Self::COUNT] = [
        RecallKind::Container,
        RecallKind::Buffer,
        RecallKind::Playback,
        RecallKind::Volume,
        RecallKind::Counter,
        RecallKind::Fade,
        RecallKind::Plugin,
    ];

    /// Index into per-kind tables.
    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            RecallKind::Container => "container",
            RecallKind::Buffer => "buffer",
            RecallKind::Playback => "playback",
            RecallKind::Volume => "volume",
            RecallKind::Counter => "counter",
            RecallKind::Fade => "fade",
            RecallKind::Plugin => "plugin",
        }
    }
}

/// Capability and behaviour flags of a recall template.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecallFlags {
    /// Produces audio into downstream channels.
    pub output: bool,
    /// Consumes audio from its own channel.
    pub input: bool,
    /// Owns child instances.
    pub children: bool,
    /// Survives `cancel` until `stop_persistent` is called.
    pub persistent: bool,
    /// Marks the parent done once every child is done.
    pub propagate_done: bool,
    /// Scopes this template may be duplicated for.
    pub scopes: ScopeMask,
}

impl Default for RecallFlags {
    fn default() -> Self {
        Self {
            output: false,
            input: false,
            children: false,
            persistent: false,
            propagate_done: false,
            scopes: ScopeMask::ALL,
        }
    }
}

impl RecallFlags {
    pub fn input() -> Self {
        Self {
            input: true,
            ..Default::default()
        }
    }

    pub fn output() -> Self {
        Self {
            output: true,
            ..Default::default()
        }
    }

    pub fn container() -> Self {
        Self {
            children: true,
            propagate_done: true,
            ..Default::default()
        }
    }

    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }

    pub fn in_scopes(mut self, scopes: ScopeMask) -> Self {
        self.scopes = scopes;
        self
    }

    /// Whether instances may be created for `scope`.
    pub fn duplicable_for(&self, scope: SoundScope) -> bool {
        self.scopes.contains(scope)
    }
}
