//! Sample formats and the additive copy routines between them.
//!
//! Every copy between two buffers goes through a [`CopyMode`], chosen once for a
//! `(destination, source)` format pair. The copy is additive: the converted source
//! sample is summed into whatever the destination already holds, which is how
//! several signals mix into one buffer.

use crate::buffer::SampleBuffer;

/// Storage format of a sample buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum SampleFormat {
    S8,
    #[default]
    S16,
    /// 24-bit integer samples stored in the low bits of an `i32`.
    S24,
    S32,
    S64,
    Float,
    Double,
}

impl SampleFormat {
    /// All formats, narrowest integer first.
    pub const ALL: [SampleFormat; 7] = [
        SampleFormat::S8,
        SampleFormat::S16,
        SampleFormat::S24,
        SampleFormat::S32,
        SampleFormat::S64,
        SampleFormat::Float,
        SampleFormat::Double,
    ];

    /// Significant bits per sample.
    pub const fn bits(self) -> u32 {
        match self {
            SampleFormat::S8 => 8,
            SampleFormat::S16 => 16,
            SampleFormat::S24 => 24,
            SampleFormat::S32 => 32,
            SampleFormat::S64 => 64,
            SampleFormat::Float => 32,
            SampleFormat::Double => 64,
        }
    }

    /// Whether samples are stored as floating point.
    pub const fn is_float(self) -> bool {
        matches!(self, SampleFormat::Float | SampleFormat::Double)
    }

    /// Magnitude of a full-scale sample: `2^(bits-1)` for integers, 1.0 for floats.
    pub fn full_scale(self) -> f64 {
        if self.is_float() {
            1.0
        } else {
            libm::exp2((self.bits() - 1) as f64)
        }
    }

    /// Integer format for a bit width, if one exists.
    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            8 => Some(SampleFormat::S8),
            16 => Some(SampleFormat::S16),
            24 => Some(SampleFormat::S24),
            32 => Some(SampleFormat::S32),
            64 => Some(SampleFormat::S64),
            _ => None,
        }
    }
}

/// An intermediate sample value while converting between formats.
///
/// Integers are left-aligned to 64 bits so that widening and narrowing are plain
/// shifts; floats are normalized to `[-1.0, 1.0)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Value {
    Int(i64),
    Real(f64),
}

impl Value {
    /// Normalized floating point view of the value.
    pub fn to_f64(self) -> f64 {
        match self {
            Value::Int(v) => v as f64 / TWO_POW_63,
            Value::Real(f) => f,
        }
    }
}

const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;

/// A primitive sample type one of the buffer variants stores.
///
/// `bits` is passed explicitly because S24 and S32 share `i32` storage.
pub trait Sample: Copy + Default + PartialEq + 'static {
    /// Read this sample as an intermediate value.
    fn to_value(self, bits: u32) -> Value;
    /// Return `self + value`, converted to this type and saturated.
    fn add_value(self, value: Value, bits: u32) -> Self;
}

fn int_range(bits: u32) -> (i64, i64) {
    (i64::MIN >> (64 - bits), i64::MAX >> (64 - bits))
}

fn int_from_value(value: Value, bits: u32) -> i64 {
    match value {
        Value::Int(v) => v >> (64 - bits),
        Value::Real(f) => {
            let (min, max) = int_range(bits);
            let scaled = libm::round(f * libm::exp2((bits - 1) as f64));
            // `as` saturates at the i64 bounds; clamp to the format's range
            (scaled as i64).clamp(min, max)
        }
    }
}

macro_rules! int_sample {
    ($t:ty) => {
        impl Sample for $t {
            #[inline]
            fn to_value(self, bits: u32) -> Value {
                Value::Int((self as i64) << (64 - bits))
            }

            #[inline]
            fn add_value(self, value: Value, bits: u32) -> Self {
                let (min, max) = int_range(bits);
                let sum = (self as i64).saturating_add(int_from_value(value, bits));
                sum.clamp(min, max) as $t
            }
        }
    };
}

int_sample!(i8);
int_sample!(i16);
int_sample!(i32);
int_sample!(i64);

macro_rules! float_sample {
    ($t:ty) => {
        impl Sample for $t {
            #[inline]
            fn to_value(self, _bits: u32) -> Value {
                Value::Real(self as f64)
            }

            #[inline]
            fn add_value(self, value: Value, _bits: u32) -> Self {
                self + value.to_f64() as $t
            }
        }
    };
}

float_sample!(f32);
float_sample!(f64);

/// A conversion routine chosen for one `(destination, source)` format pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CopyMode {
    pub destination: SampleFormat,
    pub source: SampleFormat,
}

/// Geometry of one side of a copy: start offset and interleave stride.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Span {
    pub offset: usize,
    pub stride: usize,
}

impl Span {
    /// Contiguous span starting at `offset`.
    pub const fn at(offset: usize) -> Self {
        Self { offset, stride: 1 }
    }

    /// Interleaved span: one channel out of `stride`.
    pub const fn interleaved(offset: usize, stride: usize) -> Self {
        Self { offset, stride }
    }

    fn frames_available(self, len: usize) -> usize {
        if self.stride == 0 || self.offset >= len {
            return 0;
        }
        (len - self.offset).div_ceil(self.stride)
    }
}

impl CopyMode {
    /// Select the routine for copying `source`-formatted data into `destination`.
    pub const fn select(destination: SampleFormat, source: SampleFormat) -> Self {
        Self { destination, source }
    }

    /// Whether this mode converts between formats.
    pub fn converts(&self) -> bool {
        self.destination != self.source
    }

    /// Additively copy up to `count` frames from `src` into `dst`.
    ///
    /// Returns the number of frames actually copied, which is `count` clamped to
    /// what both spans can hold. Buffers whose format does not match the mode
    /// copy nothing.
    pub fn copy(
        &self,
        dst: &mut SampleBuffer,
        dst_span: Span,
        src: &SampleBuffer,
        src_span: Span,
        count: usize,
    ) -> usize {
        if dst.format() != self.destination || src.format() != self.source {
            return 0;
        }
        let src_bits = self.source.bits();
        let dst_bits = self.destination.bits();
        match src {
            SampleBuffer::S8(s) => copy_into(dst, dst_span, dst_bits, s, src_span, src_bits, count),
            SampleBuffer::S16(s) => copy_into(dst, dst_span, dst_bits, s, src_span, src_bits, count),
            SampleBuffer::S24(s) => copy_into(dst, dst_span, dst_bits, s, src_span, src_bits, count),
            SampleBuffer::S32(s) => copy_into(dst, dst_span, dst_bits, s, src_span, src_bits, count),
            SampleBuffer::S64(s) => copy_into(dst, dst_span, dst_bits, s, src_span, src_bits, count),
            SampleBuffer::Float(s) => copy_into(dst, dst_span, dst_bits, s, src_span, src_bits, count),
            SampleBuffer::Double(s) => copy_into(dst, dst_span, dst_bits, s, src_span, src_bits, count),
        }
    }
}

fn copy_into<S: Sample>(
    dst: &mut SampleBuffer,
    dst_span: Span,
    dst_bits: u32,
    src: &[S],
    src_span: Span,
    src_bits: u32,
    count: usize,
) -> usize {
    match dst {
        SampleBuffer::S8(d) => copy_slice(d, dst_span, dst_bits, src, src_span, src_bits, count),
        SampleBuffer::S16(d) => copy_slice(d, dst_span, dst_bits, src, src_span, src_bits, count),
        SampleBuffer::S24(d) => copy_slice(d, dst_span, dst_bits, src, src_span, src_bits, count),
        SampleBuffer::S32(d) => copy_slice(d, dst_span, dst_bits, src, src_span, src_bits, count),
        SampleBuffer::S64(d) => copy_slice(d, dst_span, dst_bits, src, src_span, src_bits, count),
        SampleBuffer::Float(d) => copy_slice(d, dst_span, dst_bits, src, src_span, src_bits, count),
        SampleBuffer::Double(d) => copy_slice(d, dst_span, dst_bits, src, src_span, src_bits, count),
    }
}

fn copy_slice<D: Sample, S: Sample>(
    dst: &mut [D],
    dst_span: Span,
    dst_bits: u32,
    src: &[S],
    src_span: Span,
    src_bits: u32,
    count: usize,
) -> usize {
    let frames = count
        .min(dst_span.frames_available(dst.len()))
        .min(src_span.frames_available(src.len()));
    for i in 0..frames {
        let d = dst_span.offset + i * dst_span.stride;
        let s = src_span.offset + i * src_span.stride;
        dst[d] = dst[d].add_value(src[s].to_value(src_bits), dst_bits);
    }
    frames
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn round_trip(a: SampleFormat, b: SampleFormat, original: &SampleBuffer) -> SampleBuffer {
        let len = original.len();
        let mut wide = SampleBuffer::new(b, len);
        CopyMode::select(b, a).copy(&mut wide, Span::at(0), original, Span::at(0), len);
        let mut back = SampleBuffer::new(a, len);
        CopyMode::select(a, b).copy(&mut back, Span::at(0), &wide, Span::at(0), len);
        back
    }

    #[test]
    fn s16_through_float_is_exact() {
        let src = SampleBuffer::S16(vec![i16::MIN, -12345, -1, 0, 1, 777, i16::MAX]);
        assert_eq!(round_trip(SampleFormat::S16, SampleFormat::Float, &src), src);
    }

    #[test]
    fn s24_through_float_is_exact() {
        let max = (1 << 23) - 1;
        let src = SampleBuffer::S24(vec![-(1 << 23), -4_000_000, -1, 0, 1, 3_999_999, max]);
        assert_eq!(round_trip(SampleFormat::S24, SampleFormat::Float, &src), src);
    }

    #[test]
    fn s32_through_double_is_exact() {
        let src = SampleBuffer::S32(vec![i32::MIN, -65_537, 0, 99, i32::MAX]);
        assert_eq!(round_trip(SampleFormat::S32, SampleFormat::Double, &src), src);
    }

    #[test]
    fn integer_widening_round_trips() {
        let src = SampleBuffer::S8(vec![i8::MIN, -3, 0, 5, i8::MAX]);
        for wide in [SampleFormat::S16, SampleFormat::S24, SampleFormat::S32, SampleFormat::S64] {
            assert_eq!(round_trip(SampleFormat::S8, wide, &src), src, "via {:?}", wide);
        }
    }

    #[test]
    fn same_format_copy_is_identity() {
        let src = SampleBuffer::S16(vec![-5, 0, 5, 300]);
        assert_eq!(round_trip(SampleFormat::S16, SampleFormat::S16, &src), src);
    }

    #[test]
    fn copy_is_additive_and_saturates() {
        let mut dst = SampleBuffer::S16(vec![30_000, -30_000, 10]);
        let src = SampleBuffer::S16(vec![10_000, -10_000, 5]);
        CopyMode::select(SampleFormat::S16, SampleFormat::S16).copy(&mut dst, Span::at(0), &src, Span::at(0), 3);
        assert_eq!(dst, SampleBuffer::S16(vec![i16::MAX, i16::MIN, 15]));
    }

    #[test]
    fn float_to_int_clamps_full_scale() {
        let mut dst = SampleBuffer::new(SampleFormat::S16, 2);
        let src = SampleBuffer::Float(vec![1.0, -1.0]);
        CopyMode::select(SampleFormat::S16, SampleFormat::Float).copy(&mut dst, Span::at(0), &src, Span::at(0), 2);
        assert_eq!(dst, SampleBuffer::S16(vec![i16::MAX, i16::MIN]));
    }

    #[test]
    fn narrowing_shifts_down() {
        let mut dst = SampleBuffer::new(SampleFormat::S8, 2);
        let src = SampleBuffer::S16(vec![256, -512]);
        CopyMode::select(SampleFormat::S8, SampleFormat::S16).copy(&mut dst, Span::at(0), &src, Span::at(0), 2);
        assert_eq!(dst, SampleBuffer::S8(vec![1, -2]));
    }

    #[test]
    fn interleaved_copy_respects_stride() {
        let mut dst = SampleBuffer::new(SampleFormat::S16, 6);
        let src = SampleBuffer::S16(vec![1, 2, 3]);
        let copied = CopyMode::select(SampleFormat::S16, SampleFormat::S16).copy(
            &mut dst,
            Span::interleaved(1, 2),
            &src,
            Span::at(0),
            3,
        );
        assert_eq!(copied, 3);
        assert_eq!(dst, SampleBuffer::S16(vec![0, 1, 0, 2, 0, 3]));
    }

    #[test]
    fn count_is_clamped_to_buffers() {
        let mut dst = SampleBuffer::new(SampleFormat::Float, 4);
        let src = SampleBuffer::Float(vec![0.5; 8]);
        let copied = CopyMode::select(SampleFormat::Float, SampleFormat::Float).copy(
            &mut dst,
            Span::at(2),
            &src,
            Span::at(0),
            8,
        );
        assert_eq!(copied, 2);
    }

    #[test]
    fn mismatched_mode_copies_nothing() {
        let mut dst = SampleBuffer::new(SampleFormat::S16, 2);
        let src = SampleBuffer::Float(vec![0.5, 0.5]);
        let copied = CopyMode::select(SampleFormat::S16, SampleFormat::S16).copy(&mut dst, Span::at(0), &src, Span::at(0), 2);
        assert_eq!(copied, 0);
    }

    #[test]
    fn from_bits_rejects_unsupported_width() {
        assert_eq!(SampleFormat::from_bits(24), Some(SampleFormat::S24));
        assert_eq!(SampleFormat::from_bits(12), None);
    }
}
