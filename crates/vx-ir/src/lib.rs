//! Core data types for the voxgraph audio host.
//!
//! Sample formats and buffers, presets, scopes, musical time, unit conversion,
//! automation curves and recall descriptors. Everything here is plain data;
//! the engine crate owns the runtime state built from it.
//!
//! Designed to be `no_std` compatible with the `alloc` crate.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod automation;
mod buffer;
mod conversion;
mod format;
mod presets;
mod recall;
mod scope;
mod timestamp;

pub use automation::{interpolate, Automation, AutomationPoint, CurveKind, MAX_POINTS};
pub use buffer::SampleBuffer;
pub use conversion::{Conversion, Scale};
pub use format::{CopyMode, Sample, SampleFormat, Span, Value};
pub use presets::{Presets, DEFAULT_BUFFER_SIZE, DEFAULT_PCM_CHANNELS, DEFAULT_SAMPLERATE};
pub use recall::{RecallFlags, RecallKind};
pub use scope::{ScopeMask, SoundScope};
pub use timestamp::Timestamp;
