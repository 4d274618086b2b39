//! CPAL-based audio output backend.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, SampleRate, Stream, StreamConfig};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};
use vx_ir::Presets;

use crate::ring::SlotRing;
use crate::traits::{AudioError, Backend, BackendEvent};

const EVENT_CAPACITY: usize = 64;

/// CPAL-based audio output.
///
/// The stream callback drains committed slots in order and reports
/// starvation through an SPSC event ring. `Stream` is not `Send` on every
/// platform, so build this on the thread that drives it.
pub struct CpalOutput {
    presets: Presets,
    ring: Arc<SlotRing>,
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
    events: HeapCons<BackendEvent>,
    producer: Option<HeapProd<BackendEvent>>,
    running: Arc<AtomicBool>,
    lost: Arc<AtomicBool>,
    lost_reported: bool,
}

impl CpalOutput {
    /// Open the default output device with `presets`' channel count and
    /// samplerate.
    pub fn new(presets: Presets, slot_count: usize) -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(AudioError::NoDevice)?;

        // probe the device; the stream itself uses our layout
        device
            .default_output_config()
            .map_err(|e| AudioError::DeviceInit(e.to_string()))?;
        let config = StreamConfig {
            channels: presets.pcm_channels,
            sample_rate: SampleRate(presets.samplerate),
            buffer_size: BufferSize::Default,
        };

        let (producer, events) = HeapRb::<BackendEvent>::new(EVENT_CAPACITY).split();

        Ok(Self {
            presets,
            ring: Arc::new(SlotRing::new(presets, slot_count)?),
            device,
            config,
            stream: None,
            events,
            producer: Some(producer),
            running: Arc::new(AtomicBool::new(false)),
            lost: Arc::new(AtomicBool::new(false)),
            lost_reported: false,
        })
    }

    /// Build and start the audio stream.
    pub fn build_stream(&mut self) -> Result<(), AudioError> {
        let Some(producer) = self.producer.take() else {
            return Ok(());
        };
        let mut drain = Drain {
            ring: self.ring.clone(),
            offset: 0,
            events: producer,
        };
        let running = self.running.clone();
        let lost = self.lost.clone();

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if !running.load(Ordering::Relaxed) {
                        data.fill(0.0);
                        return;
                    }
                    drain.fill(data);
                },
                move |err| {
                    error!(error = %err, "audio stream error");
                    lost.store(true, Ordering::Relaxed);
                },
                None,
            )
            .map_err(|e| AudioError::StreamCreate(e.to_string()))?;

        stream.play().map_err(|e| AudioError::Playback(e.to_string()))?;
        self.stream = Some(stream);
        info!(
            channels = self.config.channels,
            samplerate = self.presets.samplerate,
            slots = self.ring.len(),
            "cpal stream running"
        );
        Ok(())
    }
}

impl Backend for CpalOutput {
    fn ring(&self) -> &SlotRing {
        &self.ring
    }

    fn presets(&self) -> Presets {
        self.presets
    }

    fn commit(&mut self) -> Result<(), AudioError> {
        self.ring.commit().map(|_| ())
    }

    fn poll_event(&mut self) -> Option<BackendEvent> {
        if !self.lost_reported && self.lost.load(Ordering::Relaxed) {
            self.lost_reported = true;
            return Some(BackendEvent::DeviceLost);
        }
        self.events.try_pop()
    }

    fn start(&mut self) -> Result<(), AudioError> {
        self.running.store(true, Ordering::Relaxed);
        if self.stream.is_none() {
            return self.build_stream();
        }
        if let Some(ref stream) = self.stream {
            stream.play().map_err(|e| AudioError::Playback(e.to_string()))?;
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.running.store(false, Ordering::Relaxed);
        if let Some(ref stream) = self.stream {
            stream.pause().map_err(|e| AudioError::Playback(e.to_string()))?;
        }
        Ok(())
    }
}

/// Device-side reader: walks committed slots and converts them to `f32`.
struct Drain {
    ring: Arc<SlotRing>,
    /// Read position inside the slot at the ring's read index.
    offset: usize,
    events: HeapProd<BackendEvent>,
}

impl Drain {
    fn fill(&mut self, data: &mut [f32]) {
        let mut written = 0;
        let mut starved = false;
        while written < data.len() {
            let Some(slot) = self.ring.next_read() else {
                starved = true;
                break;
            };
            let Some(buffer) = self.ring.try_lock(slot) else {
                starved = true;
                break;
            };
            let n = buffer.len().saturating_sub(self.offset).min(data.len() - written);
            for (i, out) in data[written..written + n].iter_mut().enumerate() {
                *out = buffer.get_f64(self.offset + i) as f32;
            }
            let slot_len = buffer.len();
            drop(buffer);
            written += n;
            self.offset += n;
            if self.offset >= slot_len {
                self.offset = 0;
                self.ring.release();
            }
        }
        data[written..].fill(0.0);
        // nothing committed yet is pre-roll, not an underrun
        if starved && self.ring.committed() > 0 {
            let _ = self.events.try_push(BackendEvent::Underrun);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vx_ir::SampleFormat;

    fn drain(slots: usize) -> (Drain, HeapCons<BackendEvent>) {
        let presets = Presets::new(2, 48000, 2, SampleFormat::S16);
        let (events, rx) = HeapRb::<BackendEvent>::new(8).split();
        let ring = Arc::new(SlotRing::new(presets, slots).unwrap());
        (Drain { ring, offset: 0, events }, rx)
    }

    fn commit(ring: &SlotRing, value: f64) {
        let slot = ring.next_write().unwrap();
        let mut guard = ring.lock(slot).unwrap();
        for i in 0..guard.len() {
            guard.set_f64(i, value);
        }
        drop(guard);
        ring.commit().unwrap();
    }

    #[test]
    fn drains_across_slot_boundaries() {
        let (mut d, mut rx) = drain(2);
        commit(&d.ring, 0.5);
        commit(&d.ring, -0.5);
        let mut out = [1.0f32; 6];
        d.fill(&mut out);
        assert_eq!(out, [0.5, 0.5, 0.5, 0.5, -0.5, -0.5]);
        assert_eq!(d.ring.pending(), 1);
        assert_eq!(rx.try_pop(), None);

        let mut out = [1.0f32; 2];
        d.fill(&mut out);
        assert_eq!(out, [-0.5, -0.5]);
        assert_eq!(d.ring.pending(), 0);
    }

    #[test]
    fn starvation_is_silent_and_reported() {
        let (mut d, mut rx) = drain(2);
        commit(&d.ring, 0.25);
        let mut out = [1.0f32; 8];
        d.fill(&mut out);
        assert_eq!(&out[..4], &[0.25; 4]);
        assert_eq!(&out[4..], &[0.0; 4]);
        assert_eq!(rx.try_pop(), Some(BackendEvent::Underrun));
    }

    #[test]
    fn preroll_is_not_an_underrun() {
        let (mut d, mut rx) = drain(2);
        let mut out = [1.0f32; 4];
        d.fill(&mut out);
        assert_eq!(out, [0.0; 4]);
        assert_eq!(rx.try_pop(), None);
    }

    #[test]
    fn slot_held_by_producer_is_skipped() {
        let (mut d, mut rx) = drain(2);
        commit(&d.ring, 0.25);
        let ring = d.ring.clone();
        let held = ring.lock(0).unwrap();
        let mut out = [1.0f32; 4];
        d.fill(&mut out);
        drop(held);
        assert_eq!(out, [0.0; 4]);
        assert_eq!(rx.try_pop(), Some(BackendEvent::Underrun));
    }
}
