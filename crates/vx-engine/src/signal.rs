//! AudioSignal: a stream of fixed-size buffers with a current cursor.

use std::collections::VecDeque;

use vx_ir::{Presets, SampleBuffer, SampleFormat, SoundScope};

use crate::context::ContextId;
use crate::topology::RecyclingId;

/// Signal flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SignalFlags {
    /// Immutable prototype; never advanced or routed.
    pub template: bool,
    /// The current/next pair fell behind and must be resynchronized before
    /// the next write.
    pub backlog: bool,
    /// A mix target created by routing, keyed by scope.
    pub destination: bool,
}

/// A lazily consumed sequence of buffers.
///
/// The front of `stream` is the current buffer; an empty stream means the
/// cursor is null and the signal is on its final tick.
#[derive(Clone, Debug)]
pub struct AudioSignal {
    pub scope: SoundScope,
    /// Owning voice context. `None` only for templates.
    pub context: Option<ContextId>,
    pub samplerate: u32,
    pub buffer_size: usize,
    pub format: SampleFormat,
    pub stream: VecDeque<SampleBuffer>,
    /// Offset of the logical start inside the first buffer, in this signal's samples.
    pub attack: usize,
    /// Read position inside the current buffer. Non-zero only while a source
    /// is consumed at another samplerate's pace.
    pub offset: usize,
    /// Live sources currently delivering into this destination.
    pub feeders: u32,
    pub flags: SignalFlags,
    /// Destination recyclings this signal has registered itself as a feeder of.
    pub feeding: Vec<RecyclingId>,
    /// Resampling scratch, allocated when a source with another samplerate feeds in.
    pub scratch: Option<SampleBuffer>,
}

impl AudioSignal {
    /// An empty template configured by `presets` (mono).
    pub fn template(presets: Presets) -> Self {
        Self {
            scope: SoundScope::Playback,
            context: None,
            samplerate: presets.samplerate,
            buffer_size: presets.buffer_size,
            format: presets.format,
            stream: VecDeque::new(),
            attack: 0,
            offset: 0,
            feeders: 0,
            flags: SignalFlags {
                template: true,
                ..Default::default()
            },
            feeding: Vec::new(),
            scratch: None,
        }
    }

    /// A double-buffered mix target for `scope` under `context`.
    pub fn destination(scope: SoundScope, context: ContextId, presets: Presets) -> Self {
        let mut stream = VecDeque::with_capacity(2);
        stream.push_back(SampleBuffer::new(presets.format, presets.buffer_size));
        stream.push_back(SampleBuffer::new(presets.format, presets.buffer_size));
        Self {
            scope,
            context: Some(context),
            samplerate: presets.samplerate,
            buffer_size: presets.buffer_size,
            format: presets.format,
            stream,
            attack: 0,
            offset: 0,
            feeders: 0,
            flags: SignalFlags {
                destination: true,
                ..Default::default()
            },
            feeding: Vec::new(),
            scratch: None,
        }
    }

    /// Duplicate a template into a runtime signal owned by `context`.
    pub fn instantiate(&self, scope: SoundScope, context: ContextId, attack: usize) -> Self {
        Self {
            scope,
            context: Some(context),
            attack: attack.min(self.buffer_size),
            offset: 0,
            flags: SignalFlags::default(),
            feeders: 0,
            feeding: Vec::new(),
            scratch: None,
            ..self.clone()
        }
    }

    /// Replace the stream with `data` split into `buffer_size` chunks.
    ///
    /// The last chunk is zero padded. Samples are given normalized.
    pub fn load_normalized(&mut self, data: &[f64]) {
        self.stream.clear();
        for chunk in data.chunks(self.buffer_size.max(1)) {
            let mut buffer = SampleBuffer::new(self.format, self.buffer_size);
            for (i, &s) in chunk.iter().enumerate() {
                buffer.set_f64(i, s);
            }
            self.stream.push_back(buffer);
        }
    }

    /// Append an already formatted buffer to the stream.
    pub fn push_buffer(&mut self, buffer: SampleBuffer) {
        self.stream.push_back(buffer);
    }

    pub fn is_template(&self) -> bool {
        self.flags.template
    }

    pub fn is_destination(&self) -> bool {
        self.flags.destination
    }

    pub fn current(&self) -> Option<&SampleBuffer> {
        self.stream.front()
    }

    pub fn current_mut(&mut self) -> Option<&mut SampleBuffer> {
        self.stream.front_mut()
    }

    pub fn next(&self) -> Option<&SampleBuffer> {
        self.stream.get(1)
    }

    /// Mutable access to `current` and `next` together.
    pub fn current_and_next(&mut self) -> (Option<&mut SampleBuffer>, Option<&mut SampleBuffer>) {
        let mut iter = self.stream.iter_mut();
        let current = iter.next();
        let next = iter.next();
        (current, next)
    }

    /// Move the cursor to the next buffer.
    ///
    /// A destination that still has feeders grows a fresh silent `next` so it
    /// stays double-buffered. Templates never move.
    pub fn advance(&mut self) {
        if self.flags.template {
            return;
        }
        self.stream.pop_front();
        if self.flags.destination && self.feeders > 0 {
            while self.stream.len() < 2 {
                self.stream
                    .push_back(SampleBuffer::new(self.format, self.buffer_size));
            }
        }
    }

    /// Consume `samples` from the read position, advancing past every buffer
    /// that is used up.
    pub fn consume(&mut self, samples: usize) {
        if self.flags.template {
            return;
        }
        self.offset += samples;
        while self.offset >= self.buffer_size.max(1) && self.current().is_some() {
            self.offset -= self.buffer_size.max(1);
            self.advance();
        }
        if self.current().is_none() {
            self.offset = 0;
        }
    }

    /// Samples left from the read position to the end of the stream.
    pub fn remaining(&self) -> usize {
        (self.stream.len() * self.buffer_size).saturating_sub(self.offset)
    }

    /// Normalized sample `index` past the read position, or 0.0 beyond the end.
    pub fn sample_at(&self, index: usize) -> f64 {
        let at = self.offset + index;
        let size = self.buffer_size.max(1);
        self.stream
            .get(at / size)
            .map_or(0.0, |buffer| buffer.get_f64(at % size))
    }

    /// Top a destination back up to a `current` + `next` pair.
    pub fn ensure_double_buffered(&mut self) {
        while self.stream.len() < 2 {
            self.stream
                .push_back(SampleBuffer::new(self.format, self.buffer_size));
        }
    }

    /// Promote `next` into `current` and clear `next`.
    pub fn resync(&mut self) {
        let (current, next) = self.current_and_next();
        if let (Some(current), Some(next)) = (current, next) {
            current.assign(next);
            next.silence();
        }
        self.flags.backlog = false;
    }

    /// Whether every buffered sample is zero.
    pub fn is_silent(&self) -> bool {
        self.stream.iter().all(SampleBuffer::is_silent)
    }

    /// Make sure the scratch buffer holds at least `len` samples of `format`.
    pub fn ensure_scratch(&mut self, format: SampleFormat, len: usize) {
        let fits = self
            .scratch
            .as_ref()
            .is_some_and(|s| s.format() == format && s.len() >= len);
        if !fits {
            self.scratch = Some(SampleBuffer::new(format, len));
        }
    }
}
