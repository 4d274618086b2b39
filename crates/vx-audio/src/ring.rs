//! N-slot ring of mutex-guarded sample buffers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use vx_ir::{Presets, SampleBuffer};

use crate::traits::AudioError;

/// Fixed ring of `2..=8` slots, each one interleaved buffer.
///
/// The producer owns slot `written % n` until it commits; the consumer owns
/// slot `read % n` until it releases. Both counters only grow, so a slot is
/// never owned by both sides. Each slot has its own lock so filling one never
/// waits on the device draining another.
pub struct SlotRing {
    slots: Box<[Mutex<SampleBuffer>]>,
    written: AtomicU64,
    read: AtomicU64,
}

impl SlotRing {
    pub const MIN_SLOTS: usize = 2;
    pub const MAX_SLOTS: usize = 8;

    pub fn new(presets: Presets, count: usize) -> Result<Self, AudioError> {
        if !(Self::MIN_SLOTS..=Self::MAX_SLOTS).contains(&count) {
            return Err(AudioError::InvalidSlotCount(count));
        }
        let slots = (0..count)
            .map(|_| Mutex::new(SampleBuffer::new(presets.format, presets.slot_len())))
            .collect();
        Ok(Self {
            slots,
            written: AtomicU64::new(0),
            read: AtomicU64::new(0),
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slots committed but not yet released by the consumer.
    pub fn pending(&self) -> usize {
        let written = self.written.load(Ordering::Acquire);
        let read = self.read.load(Ordering::Acquire);
        written.saturating_sub(read) as usize
    }

    /// Total number of commits.
    pub fn committed(&self) -> u64 {
        self.written.load(Ordering::Acquire)
    }

    pub fn next_write(&self) -> Option<usize> {
        (self.pending() < self.len())
            .then(|| (self.written.load(Ordering::Acquire) % self.len() as u64) as usize)
    }

    pub fn next_read(&self) -> Option<usize> {
        (self.pending() > 0).then(|| (self.read.load(Ordering::Acquire) % self.len() as u64) as usize)
    }

    pub fn lock(&self, slot: usize) -> Result<MutexGuard<'_, SampleBuffer>, AudioError> {
        let slot = self.slots.get(slot).ok_or(AudioError::SlotOutOfRange(slot))?;
        Ok(slot.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Non-blocking lock for the device callback.
    pub fn try_lock(&self, slot: usize) -> Option<MutexGuard<'_, SampleBuffer>> {
        self.slots.get(slot)?.try_lock().ok()
    }

    pub fn clear(&self, slot: usize) -> Result<(), AudioError> {
        self.lock(slot)?.silence();
        Ok(())
    }

    /// Hand the slot at the write position to the consumer.
    pub fn commit(&self) -> Result<u64, AudioError> {
        if self.pending() >= self.len() {
            return Err(AudioError::RingFull);
        }
        Ok(self.written.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// Give the slot at the read position back to the producer.
    pub fn release(&self) -> bool {
        if self.pending() == 0 {
            return false;
        }
        self.read.fetch_add(1, Ordering::AcqRel);
        true
    }
}
