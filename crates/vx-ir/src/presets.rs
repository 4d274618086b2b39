//! Backend and channel presets.

use crate::format::SampleFormat;

/// Default number of interleaved output channels.
pub const DEFAULT_PCM_CHANNELS: u16 = 2;

/// Default samplerate in Hz.
pub const DEFAULT_SAMPLERATE: u32 = 44100;

/// Default buffer size in frames.
pub const DEFAULT_BUFFER_SIZE: usize = 512;

/// The `(pcm_channels, samplerate, buffer_size, format)` quadruple a backend
/// presents and every channel is configured with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Presets {
    pub pcm_channels: u16,
    pub samplerate: u32,
    pub buffer_size: usize,
    pub format: SampleFormat,
}

impl Default for Presets {
    fn default() -> Self {
        Self {
            pcm_channels: DEFAULT_PCM_CHANNELS,
            samplerate: DEFAULT_SAMPLERATE,
            buffer_size: DEFAULT_BUFFER_SIZE,
            format: SampleFormat::S16,
        }
    }
}

impl Presets {
    pub fn new(pcm_channels: u16, samplerate: u32, buffer_size: usize, format: SampleFormat) -> Self {
        Self {
            pcm_channels,
            samplerate,
            buffer_size,
            format,
        }
    }

    /// Same presets, mono.
    pub fn mono(self) -> Self {
        Self {
            pcm_channels: 1,
            ..self
        }
    }

    /// Length of one interleaved slot in samples.
    pub fn slot_len(&self) -> usize {
        self.pcm_channels as usize * self.buffer_size
    }

    /// Duration of one buffer in seconds.
    pub fn buffer_seconds(&self) -> f64 {
        if self.samplerate == 0 {
            return 0.0;
        }
        self.buffer_size as f64 / self.samplerate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let p = Presets::default();
        assert_eq!(p.slot_len(), 1024);
        assert_eq!(p.format, SampleFormat::S16);
    }

    #[test]
    fn zero_samplerate_has_no_duration() {
        let p = Presets::new(2, 0, 512, SampleFormat::Float);
        assert_eq!(p.buffer_seconds(), 0.0);
    }
}
