//! Core of the voxgraph audio host.
//!
//! Holds the audio topology, per-voice recall instances and the routing
//! engine that mixes voice signals down to the master lines, one buffer per
//! tick.

mod clock;
mod context;
mod engine;
mod event_queue;
mod plugin;
mod port;
mod recall;
mod recycling;
pub mod resample;
pub mod routing;
mod shared;
mod signal;
pub mod step;
mod task_launcher;
pub mod tasks;
mod topology;
mod voice;

pub use clock::{Clock, TICKS_PER_BEAT};
pub use context::{ContextId, ContextTree, RecallId, RecyclingContext};
pub use engine::{Engine, EngineError, ScopeProcessor};
pub use event_queue::{EventQueue, VoiceEvent, VoiceEventKind};
pub use plugin::{DspPlugin, PluginFactory, PluginIo};
pub use port::{Port, PortError, PortFlags, PortValue, Units};
pub use recall::{
    Duplication, Instance, InstanceData, InstanceId, InstanceStatus, RecallError, RecallEvent,
    RecallGraph, Template, TemplateId,
};
pub use recycling::{Recycling, SignalId};
pub use routing::{route, RouteReport};
pub use shared::Shared;
pub use signal::{AudioSignal, SignalFlags};
pub use task_launcher::{CyclicId, Task, TaskLauncher};
pub use topology::{Audio, AudioFlags, AudioId, Channel, ChannelId, Direction, RecyclingId, Topology};
pub use voice::{Voice, VoiceSpec};
