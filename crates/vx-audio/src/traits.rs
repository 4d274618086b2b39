//! Backend trait and error types.

use std::sync::MutexGuard;

use vx_ir::{Presets, SampleBuffer};

use crate::ring::SlotRing;

/// Error type for audio operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    /// Failed to initialize audio device
    DeviceInit(String),
    /// Failed to create audio stream
    StreamCreate(String),
    /// Playback error
    Playback(String),
    /// No audio device available
    NoDevice,
    /// Slot rings hold between 2 and 8 slots
    InvalidSlotCount(usize),
    SlotOutOfRange(usize),
    /// Every slot is still waiting for the device
    RingFull,
}

impl std::fmt::Display for AudioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioError::DeviceInit(msg) => write!(f, "Device init error: {}", msg),
            AudioError::StreamCreate(msg) => write!(f, "Stream create error: {}", msg),
            AudioError::Playback(msg) => write!(f, "Playback error: {}", msg),
            AudioError::NoDevice => write!(f, "No audio device available"),
            AudioError::InvalidSlotCount(n) => write!(f, "Invalid slot count: {} (2..=8)", n),
            AudioError::SlotOutOfRange(n) => write!(f, "Slot {} out of range", n),
            AudioError::RingFull => write!(f, "All slots are pending"),
        }
    }
}

impl std::error::Error for AudioError {}

/// Something the device side noticed that the engine should react to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendEvent {
    /// The device wanted samples before a slot was committed.
    Underrun,
    /// The device went away.
    DeviceLost,
}

/// An audio output fed through an N-slot ring.
///
/// The engine side asks for the next free slot, locks it, clears it, writes
/// one buffer into it, unlocks it and commits. Commit is the point where
/// ownership of the slot passes to the device.
pub trait Backend {
    /// The ring shared with the device side.
    fn ring(&self) -> &SlotRing;

    /// Layout every slot is in. Fixed for the backend's lifetime.
    fn presets(&self) -> Presets;

    /// Advance the write position, handing the filled slot to the device.
    fn commit(&mut self) -> Result<(), AudioError>;

    /// Next device-side event, if any.
    fn poll_event(&mut self) -> Option<BackendEvent>;

    /// Start playback.
    fn start(&mut self) -> Result<(), AudioError>;

    /// Stop playback.
    fn stop(&mut self) -> Result<(), AudioError>;

    fn slot_count(&self) -> usize {
        self.ring().len()
    }

    /// Index of the slot to fill next, or `None` while every slot is still
    /// queued for the device.
    fn get_next_slot(&self) -> Option<usize> {
        self.ring().next_write()
    }

    fn lock(&self, slot: usize) -> Result<MutexGuard<'_, SampleBuffer>, AudioError> {
        self.ring().lock(slot)
    }

    fn unlock(&self, guard: MutexGuard<'_, SampleBuffer>) {
        drop(guard);
    }

    /// Zero a slot before it is written.
    fn clear(&self, slot: usize) -> Result<(), AudioError> {
        self.ring().clear(slot)
    }
}
