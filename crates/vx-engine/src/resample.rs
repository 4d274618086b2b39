//! Stateless samplerate conversion.
//!
//! Linear interpolation stepping through the source with a 16.16 fixed-point
//! increment. Nothing is carried between calls; the caller picks the window.

use vx_ir::SampleBuffer;

/// 16.16 fixed-point step through the source per destination sample.
pub fn rate_increment(src_rate: u32, dst_rate: u32) -> u64 {
    if dst_rate == 0 {
        return 0;
    }
    ((src_rate as u64) << 16) / dst_rate as u64
}

/// Number of destination samples `src_len` source samples cover.
pub fn resampled_len(src_len: usize, src_rate: u32, dst_rate: u32) -> usize {
    if src_rate == 0 {
        return 0;
    }
    (src_len as u64 * dst_rate as u64).div_ceil(src_rate as u64) as usize
}

/// Source samples needed to fill `dst_len` destination samples.
pub fn source_len(dst_len: usize, src_rate: u32, dst_rate: u32) -> usize {
    resampled_len(dst_len, dst_rate, src_rate)
}

/// Resample `src` into the front of `dst`, overwriting it.
///
/// Returns the number of samples written, bounded by `dst.len()`. Samples of
/// `dst` past that count are left silent.
pub fn resample(src: &SampleBuffer, src_rate: u32, dst: &mut SampleBuffer, dst_rate: u32) -> usize {
    if src.is_empty() {
        dst.silence();
        return 0;
    }
    let last = src.len() - 1;
    resample_with(src.len(), |i| src.get_f64(i.min(last)), src_rate, dst, dst_rate)
}

/// Resample a window of `len` source samples read through `read`.
///
/// `read` may be asked for the sample just past the window when
/// interpolating the last step; it decides what lies there.
pub fn resample_with(
    len: usize,
    read: impl Fn(usize) -> f64,
    src_rate: u32,
    dst: &mut SampleBuffer,
    dst_rate: u32,
) -> usize {
    dst.silence();
    let increment = rate_increment(src_rate, dst_rate);
    if increment == 0 || len == 0 {
        return 0;
    }
    let count = resampled_len(len, src_rate, dst_rate).min(dst.len());
    let mut position: u64 = 0;
    for i in 0..count {
        let idx = (position >> 16) as usize;
        let frac = (position & 0xFFFF) as f64 / 65536.0;
        let a = read(idx);
        let b = read(idx + 1);
        dst.set_f64(i, a + (b - a) * frac);
        position += increment;
    }
    count
}
