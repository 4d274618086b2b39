//! Buffer routing: deliver a source signal's current buffer into every
//! admitted destination.
//!
//! Per tick and source:
//!
//! 1. An empty stream marks the final tick.
//! 2. For each destination recycling, the source context must admit it
//!    (`find_child`). Admitted destinations get a double-buffered mix signal
//!    keyed by scope, created on first delivery. A pending backlog is
//!    resynchronized, the buffer is resampled if the rates differ, and the
//!    data is split at the attack: the head into `current[attack..]`, the
//!    tail into `next[..attack]`.
//! 3. The source advances by what one destination buffer took from it: a
//!    whole buffer at equal rates, otherwise the source samples covering one
//!    destination buffer. Destinations of one channel share its audio's
//!    presets, so they agree on that amount.
//! 4. On the final tick the source is removed from its recycling.

use tracing::trace;
use vx_ir::{CopyMode, SampleBuffer, Span};

use crate::recycling::{Recycling, SignalId};
use crate::resample::{resample_with, source_len};
use crate::shared::Shared;
use crate::signal::AudioSignal;
use crate::topology::RecyclingId;

/// What one routing pass did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RouteReport {
    /// Destinations written to.
    pub delivered: usize,
    /// Destinations the source's context does not admit.
    pub skipped: usize,
    /// The source was exhausted and has been removed.
    pub final_tick: bool,
}

/// Convert an attack in source samples to destination samples, clamped to
/// the destination buffer.
pub fn convert_attack(attack: usize, src_rate: u32, dst_rate: u32, dst_buffer_size: usize) -> usize {
    if src_rate == 0 {
        return 0;
    }
    let converted = attack as u64 * dst_rate as u64 / src_rate as u64;
    (converted as usize).min(dst_buffer_size)
}

/// Route one source signal for one tick.
pub fn route(
    shared: &Shared,
    source: RecyclingId,
    signal: SignalId,
    destinations: &[RecyclingId],
) -> RouteReport {
    let mut report = RouteReport::default();
    let Some(mut src_rec) = shared.topology.lock(source) else {
        return report;
    };
    let Some(src) = src_rec.get_mut(signal) else {
        return report;
    };
    let Some(src_ctx) = src.context.filter(|_| !src.is_template()) else {
        return report;
    };
    report.final_tick = src.current().is_none();
    let scope = src.scope;
    let mut consumed = None;

    for &dest in destinations {
        if dest == source {
            continue;
        }
        if !shared.contexts().find_child(src_ctx, dest) {
            trace!(?dest, ?src_ctx, "destination not in voice scope");
            report.skipped += 1;
            continue;
        }
        let Some(mut dst_rec) = shared.topology.lock(dest) else {
            continue;
        };
        let dst_id = match dst_rec.find_destination(scope) {
            Some(id) => id,
            None => {
                let mut contexts = shared.contexts();
                let owner = contexts.toplevel(src_ctx).unwrap_or(src_ctx);
                contexts.retain(owner);
                drop(contexts);
                let mut created = AudioSignal::destination(scope, owner, dst_rec.presets);
                if !is_aligned(src, &created) {
                    created.ensure_scratch(src.format, created.buffer_size);
                }
                dst_rec.add(created)
            }
        };
        let Some(dst) = dst_rec.get_mut(dst_id) else {
            continue;
        };
        consumed = Some(deliver(src, dst));
        if !report.final_tick && !src.feeding.contains(&dest) {
            src.feeding.push(dest);
            dst.feeders += 1;
        }
        report.delivered += 1;
    }

    if report.final_tick {
        retire(shared, &mut src_rec, signal);
    } else {
        src.consume(consumed.filter(|&n| n > 0).unwrap_or(src.buffer_size));
    }
    report
}

/// Whether the source's current buffer maps one to one onto a destination buffer.
fn is_aligned(src: &AudioSignal, dst: &AudioSignal) -> bool {
    src.samplerate == dst.samplerate && src.buffer_size == dst.buffer_size && src.offset == 0
}

/// Write one destination buffer's worth of the source into `dst`.
///
/// Returns how many source samples that took. A source on its final tick
/// writes no samples but still resynchronizes a pending backlog.
pub fn deliver(src: &AudioSignal, dst: &mut AudioSignal) -> usize {
    dst.ensure_double_buffered();
    if dst.flags.backlog {
        dst.resync();
    }
    let Some(buffer) = src.current() else {
        return 0;
    };
    let attack = convert_attack(src.attack, src.samplerate, dst.samplerate, dst.buffer_size);
    let mode = CopyMode::select(dst.format, buffer.format());

    if is_aligned(src, dst) {
        split_copy(mode, buffer, dst, attack);
        return src.buffer_size;
    }
    let len = source_len(dst.buffer_size, src.samplerate, dst.samplerate);
    let last = src.remaining().saturating_sub(1);
    dst.ensure_scratch(src.format, dst.buffer_size);
    let mut scratch = dst.scratch.take();
    if let Some(scratch) = scratch.as_mut() {
        resample_with(len, |i| src.sample_at(i.min(last)), src.samplerate, scratch, dst.samplerate);
        split_copy(mode, scratch, dst, attack);
    }
    dst.scratch = scratch;
    len
}

/// Head of `data` into `current[attack..]`, the remaining `attack` samples
/// into `next[..attack]`. Additive.
pub fn split_copy(mode: CopyMode, data: &SampleBuffer, dst: &mut AudioSignal, attack: usize) {
    let size = dst.buffer_size;
    let attack = attack.min(size);
    let head = size - attack;
    let (current, next) = dst.current_and_next();
    if let Some(current) = current {
        mode.copy(current, Span::at(attack), data, Span::at(0), head);
    }
    if attack > 0 {
        if let Some(next) = next {
            mode.copy(next, Span::at(0), data, Span::at(head), attack);
        }
    }
}

/// Remove a signal from its recycling, unregister it from the destinations
/// it fed and drop its context reference.
///
/// `rec` must be the locked recycling holding `signal`.
pub fn retire(shared: &Shared, rec: &mut Recycling, signal: SignalId) -> Option<AudioSignal> {
    let removed = rec.remove(signal)?;
    for &dest in &removed.feeding {
        if let Some(mut dst_rec) = shared.topology.lock(dest) {
            if let Some(id) = dst_rec.find_destination(removed.scope) {
                if let Some(dst) = dst_rec.get_mut(id) {
                    dst.feeders = dst.feeders.saturating_sub(1);
                }
            }
        }
    }
    if let Some(ctx) = removed.context {
        shared.contexts().release(ctx);
    }
    Some(removed)
}
