//! Format-tagged sample buffer.

use alloc::vec;
use alloc::vec::Vec;

use crate::format::{Sample, SampleFormat, Value};

/// An owned run of samples in one [`SampleFormat`].
///
/// Buffers are mono unless stated otherwise; the backend's slots hold
/// `pcm_channels` interleaved channels in a single buffer.
#[derive(Clone, Debug, PartialEq)]
pub enum SampleBuffer {
    S8(Vec<i8>),
    S16(Vec<i16>),
    S24(Vec<i32>),
    S32(Vec<i32>),
    S64(Vec<i64>),
    Float(Vec<f32>),
    Double(Vec<f64>),
}

macro_rules! each_variant {
    ($buf:expr, $data:ident => $body:expr) => {
        match $buf {
            SampleBuffer::S8($data) => $body,
            SampleBuffer::S16($data) => $body,
            SampleBuffer::S24($data) => $body,
            SampleBuffer::S32($data) => $body,
            SampleBuffer::S64($data) => $body,
            SampleBuffer::Float($data) => $body,
            SampleBuffer::Double($data) => $body,
        }
    };
}

impl SampleBuffer {
    /// Create a silent buffer of `len` samples.
    pub fn new(format: SampleFormat, len: usize) -> Self {
        match format {
            SampleFormat::S8 => SampleBuffer::S8(vec![0; len]),
            SampleFormat::S16 => SampleBuffer::S16(vec![0; len]),
            SampleFormat::S24 => SampleBuffer::S24(vec![0; len]),
            SampleFormat::S32 => SampleBuffer::S32(vec![0; len]),
            SampleFormat::S64 => SampleBuffer::S64(vec![0; len]),
            SampleFormat::Float => SampleBuffer::Float(vec![0.0; len]),
            SampleFormat::Double => SampleBuffer::Double(vec![0.0; len]),
        }
    }

    /// Build a buffer from normalized `f64` samples.
    pub fn from_normalized(format: SampleFormat, samples: &[f64]) -> Self {
        let mut buffer = Self::new(format, samples.len());
        for (i, &s) in samples.iter().enumerate() {
            buffer.set_f64(i, s);
        }
        buffer
    }

    /// Storage format.
    pub fn format(&self) -> SampleFormat {
        match self {
            SampleBuffer::S8(_) => SampleFormat::S8,
            SampleBuffer::S16(_) => SampleFormat::S16,
            SampleBuffer::S24(_) => SampleFormat::S24,
            SampleBuffer::S32(_) => SampleFormat::S32,
            SampleBuffer::S64(_) => SampleFormat::S64,
            SampleBuffer::Float(_) => SampleFormat::Float,
            SampleBuffer::Double(_) => SampleFormat::Double,
        }
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        each_variant!(self, d => d.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fill all samples with zero.
    pub fn silence(&mut self) {
        each_variant!(self, d => d.fill(Default::default()))
    }

    /// Whether every sample is zero.
    pub fn is_silent(&self) -> bool {
        each_variant!(self, d => d.iter().all(|s| *s == Default::default()))
    }

    /// Read one sample, normalized to `[-1.0, 1.0)`.
    pub fn get_f64(&self, index: usize) -> f64 {
        let bits = self.format().bits();
        each_variant!(self, d => d.get(index).map_or(0.0, |s| s.to_value(bits).to_f64()))
    }

    /// Overwrite one sample from a normalized value. Out-of-range indices are ignored.
    pub fn set_f64(&mut self, index: usize, value: f64) {
        let bits = self.format().bits();
        each_variant!(self, d => {
            if let Some(s) = d.get_mut(index) {
                *s = Default::default();
                *s = s.add_value(Value::Real(value), bits);
            }
        })
    }

    /// Scale every sample by `gain`.
    pub fn apply_gain(&mut self, gain: f64) {
        for i in 0..self.len() {
            let v = self.get_f64(i);
            self.set_f64(i, v * gain);
        }
    }

    /// Copy another buffer's contents over this one, resizing to match.
    pub fn assign(&mut self, other: &SampleBuffer) {
        self.clone_from(other);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_is_silent() {
        let buf = SampleBuffer::new(SampleFormat::S24, 4);
        assert_eq!(buf.len(), 4);
        assert_eq!(buf.format(), SampleFormat::S24);
        assert!(buf.is_silent());
    }

    #[test]
    fn normalized_access_round_trips_s16() {
        let mut buf = SampleBuffer::new(SampleFormat::S16, 2);
        buf.set_f64(0, 0.5);
        buf.set_f64(1, -0.25);
        assert_eq!(buf, SampleBuffer::S16(vec![16384, -8192]));
        assert!((buf.get_f64(0) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn silence_clears_data() {
        let mut buf = SampleBuffer::Float(vec![0.1, 0.2]);
        buf.silence();
        assert!(buf.is_silent());
    }

    #[test]
    fn apply_gain_scales() {
        let mut buf = SampleBuffer::Float(vec![0.5, -0.5]);
        buf.apply_gain(0.5);
        assert_eq!(buf, SampleBuffer::Float(vec![0.25, -0.25]));
    }

    #[test]
    fn out_of_range_access_is_ignored() {
        let mut buf = SampleBuffer::new(SampleFormat::Double, 1);
        buf.set_f64(5, 1.0);
        assert_eq!(buf.get_f64(5), 0.0);
        assert!(buf.is_silent());
    }
}
