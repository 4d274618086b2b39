//! Voices: one playback invocation per scope.

use crate::context::RecallId;
use crate::recall::InstanceId;
use crate::topology::{AudioId, ChannelId};

/// What to start.
#[derive(Clone, Debug, PartialEq)]
pub struct VoiceSpec {
    /// Caller-chosen tag used to stop the voice later.
    pub tag: u64,
    pub audio: AudioId,
    /// Input channels the voice plays on.
    pub channels: Vec<ChannelId>,
    /// Normalized samples to play; `None` plays each recycling's template.
    pub samples: Option<Vec<f64>>,
}

impl VoiceSpec {
    pub fn new(tag: u64, audio: AudioId, channels: &[ChannelId]) -> Self {
        Self {
            tag,
            audio,
            channels: channels.to_vec(),
            samples: None,
        }
    }

    pub fn with_samples(mut self, samples: Vec<f64>) -> Self {
        self.samples = Some(samples);
        self
    }
}

/// A running voice.
#[derive(Clone, Debug)]
pub struct Voice {
    pub tag: u64,
    pub recall_id: RecallId,
    pub audio: AudioId,
    pub channels: Vec<ChannelId>,
    pub instances: Vec<InstanceId>,
}
