//! Transport clock: maps musical time onto buffers and attacks.

use tracing::warn;
use vx_ir::{Presets, Timestamp};

/// Ticks per beat (sixteenth-note ticks).
pub const TICKS_PER_BEAT: f64 = 4.0;

/// Position of the transport in frames, advanced one buffer at a time.
#[derive(Clone, Debug)]
pub struct Clock {
    bpm: f64,
    samplerate: u32,
    buffer_size: usize,
    /// First frame of the buffer being produced.
    frames: u64,
    /// Buffers produced so far.
    buffers: u64,
}

impl Clock {
    pub fn new(presets: Presets, bpm: f64) -> Self {
        let mut clock = Self {
            bpm: 120.0,
            samplerate: presets.samplerate,
            buffer_size: presets.buffer_size,
            frames: 0,
            buffers: 0,
        };
        clock.set_bpm(bpm);
        clock
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Change tempo. Non-positive or non-finite values are ignored.
    pub fn set_bpm(&mut self, bpm: f64) {
        if bpm.is_finite() && bpm > 0.0 {
            self.bpm = bpm;
        } else {
            warn!(bpm, "ignoring invalid tempo");
        }
    }

    pub fn frames_per_tick(&self) -> f64 {
        self.samplerate as f64 * 60.0 / (self.bpm * TICKS_PER_BEAT)
    }

    /// First frame of the current buffer.
    pub fn frame(&self) -> u64 {
        self.frames
    }

    /// One past the last frame of the current buffer.
    pub fn buffer_end(&self) -> u64 {
        self.frames + self.buffer_size as u64
    }

    pub fn buffers(&self) -> u64 {
        self.buffers
    }

    /// Tick the current buffer starts in.
    pub fn note_offset(&self) -> u64 {
        (self.frames as f64 / self.frames_per_tick()) as u64
    }

    /// Absolute frame of a timestamp.
    pub fn frame_of(&self, time: Timestamp) -> u64 {
        time.to_frames(self.frames_per_tick())
    }

    /// Offset of `time` within the current buffer.
    ///
    /// `None` if `time` lies in a later buffer. Times already passed start
    /// at offset 0.
    pub fn attack_for(&self, time: Timestamp) -> Option<usize> {
        let frame = self.frame_of(time);
        if frame >= self.buffer_end() {
            return None;
        }
        Some(frame.saturating_sub(self.frames) as usize)
    }

    /// Move on to the next buffer.
    pub fn advance(&mut self) {
        self.frames += self.buffer_size as u64;
        self.buffers += 1;
    }

    /// Jump back to the start.
    pub fn reset(&mut self) {
        self.frames = 0;
        self.buffers = 0;
    }
}
