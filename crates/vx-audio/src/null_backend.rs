//! Headless backend that keeps what it is given.

use std::collections::VecDeque;

use vx_ir::{Presets, SampleBuffer};

use crate::ring::SlotRing;
use crate::traits::{AudioError, Backend, BackendEvent};

/// Consumes every committed slot immediately and keeps a copy, for offline
/// rendering and tests.
pub struct NullBackend {
    presets: Presets,
    ring: SlotRing,
    captured: Vec<SampleBuffer>,
    events: VecDeque<BackendEvent>,
    running: bool,
}

impl NullBackend {
    pub fn new(presets: Presets, slot_count: usize) -> Result<Self, AudioError> {
        Ok(Self {
            presets,
            ring: SlotRing::new(presets, slot_count)?,
            captured: Vec::new(),
            events: VecDeque::new(),
            running: false,
        })
    }

    /// Committed slots, oldest first.
    pub fn captured(&self) -> &[SampleBuffer] {
        &self.captured
    }

    pub fn take_captured(&mut self) -> Vec<SampleBuffer> {
        std::mem::take(&mut self.captured)
    }

    /// Queue an event as if the device had raised it.
    pub fn inject(&mut self, event: BackendEvent) {
        self.events.push_back(event);
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}

impl Backend for NullBackend {
    fn ring(&self) -> &SlotRing {
        &self.ring
    }

    fn presets(&self) -> Presets {
        self.presets
    }

    fn commit(&mut self) -> Result<(), AudioError> {
        self.ring.commit()?;
        if let Some(slot) = self.ring.next_read() {
            let copy = self.ring.lock(slot)?.clone();
            self.captured.push(copy);
            self.ring.release();
        }
        Ok(())
    }

    fn poll_event(&mut self) -> Option<BackendEvent> {
        self.events.pop_front()
    }

    fn start(&mut self) -> Result<(), AudioError> {
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.running = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vx_ir::SampleFormat;

    fn backend() -> NullBackend {
        NullBackend::new(Presets::new(1, 48000, 4, SampleFormat::Float), 2).unwrap()
    }

    fn fill(backend: &mut NullBackend, value: f64) {
        let slot = backend.get_next_slot().unwrap();
        backend.clear(slot).unwrap();
        let mut guard = backend.lock(slot).unwrap();
        for i in 0..guard.len() {
            guard.set_f64(i, value);
        }
        backend.unlock(guard);
        backend.commit().unwrap();
    }

    #[test]
    fn keeps_committed_slots_in_order() {
        let mut b = backend();
        for v in [0.25, 0.5, 0.75] {
            fill(&mut b, v);
        }
        let firsts: Vec<f64> = b.captured().iter().map(|s| s.get_f64(0)).collect();
        assert_eq!(firsts, vec![0.25, 0.5, 0.75]);
        assert_eq!(b.ring().committed(), 3);
    }

    #[test]
    fn never_fills_up() {
        let mut b = backend();
        for _ in 0..10 {
            fill(&mut b, 0.1);
        }
        assert!(b.get_next_slot().is_some());
        assert_eq!(b.take_captured().len(), 10);
        assert!(b.captured().is_empty());
    }

    #[test]
    fn injected_events_come_back_in_order() {
        let mut b = backend();
        b.inject(BackendEvent::Underrun);
        b.inject(BackendEvent::DeviceLost);
        assert_eq!(b.poll_event(), Some(BackendEvent::Underrun));
        assert_eq!(b.poll_event(), Some(BackendEvent::DeviceLost));
        assert_eq!(b.poll_event(), None);
    }

    #[test]
    fn start_stop() {
        let mut b = backend();
        b.start().unwrap();
        assert!(b.is_running());
        b.stop().unwrap();
        assert!(!b.is_running());
    }
}
