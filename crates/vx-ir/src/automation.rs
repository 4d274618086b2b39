//! Breakpoint automation curves.
//!
//! An `Automation` describes how one port value moves over transport ticks.
//! The curve is evaluated by whoever owns the schedule; ports never poll it.

use arrayvec::ArrayVec;
use core::f32::consts::FRAC_PI_2;

/// Maximum breakpoints per curve.
pub const MAX_POINTS: usize = 32;

/// A piecewise curve over transport ticks.
#[derive(Clone, Debug, PartialEq)]
pub struct Automation {
    /// Breakpoints; the first point's `dt` is ignored (it starts at tick 0).
    pub points: ArrayVec<AutomationPoint, MAX_POINTS>,
    /// Restart from tick 0 once the last point is reached.
    pub looping: bool,
}

/// A breakpoint on an automation curve.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AutomationPoint {
    /// Ticks from the previous point (0 for the first point).
    pub dt: u32,
    pub value: f32,
    /// How to interpolate FROM this point TO the next.
    pub curve: CurveKind,
}

impl AutomationPoint {
    pub const fn linear(dt: u32, value: f32) -> Self {
        Self {
            dt,
            value,
            curve: CurveKind::Linear,
        }
    }
}

/// Interpolation curve between two breakpoints.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CurveKind {
    /// Hold this value until the next point.
    Step,
    /// Straight line to the next point.
    Linear,
    /// Sine quarter-wave interpolation.
    SineQuarter,
    /// Exponential curve. 0.0 = linear, >0 = starts slow, <0 = starts fast.
    Exponential(f32),
}

/// Interpolate between two values using the given curve at position `t` (0.0..1.0).
pub fn interpolate(curve: CurveKind, from: f32, to: f32, t: f32) -> f32 {
    let factor = match curve {
        CurveKind::Step => 0.0,
        CurveKind::Linear => t,
        CurveKind::SineQuarter => libm::sinf(t * FRAC_PI_2),
        CurveKind::Exponential(k) => {
            if k.abs() < 1e-6 {
                t
            } else {
                (libm::expf(k * t) - 1.0) / (libm::expf(k) - 1.0)
            }
        }
    };
    from + (to - from) * factor
}

impl Automation {
    /// Build a curve from breakpoints; points beyond [`MAX_POINTS`] are dropped.
    pub fn new(pts: &[AutomationPoint], looping: bool) -> Self {
        let mut points = ArrayVec::new();
        for p in pts.iter().take(MAX_POINTS) {
            points.push(*p);
        }
        Self { points, looping }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Total length in ticks up to the last point.
    pub fn duration(&self) -> u64 {
        self.points.iter().skip(1).map(|p| p.dt as u64).sum()
    }

    /// Curve value at `tick`, or `None` for an empty curve.
    pub fn value_at(&self, tick: u64) -> Option<f32> {
        let first = self.points.first()?;
        let duration = self.duration();
        let mut t = tick;
        if self.looping && duration > 0 {
            t %= duration;
        }

        let mut start = 0u64;
        let mut prev = first;
        for point in self.points.iter().skip(1) {
            let end = start + point.dt as u64;
            if t < end {
                let span = (end - start) as f32;
                let pos = (t - start) as f32 / span;
                return Some(interpolate(prev.curve, prev.value, point.value, pos));
            }
            start = end;
            prev = point;
        }
        Some(prev.value)
    }

    /// Sample the curve at `steps` evenly spaced ticks across its duration.
    ///
    /// Zero steps yields nothing; a zero-length curve yields its first value once.
    pub fn sample(&self, steps: u32) -> impl Iterator<Item = (u64, f32)> + '_ {
        let duration = self.duration();
        let count = if steps == 0 || self.is_empty() {
            0
        } else if duration == 0 {
            1
        } else {
            steps as u64
        };
        (0..count).filter_map(move |i| {
            let tick = i * duration / (steps as u64).max(1);
            self.value_at(tick).map(|v| (tick, v))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> Automation {
        Automation::new(
            &[AutomationPoint::linear(0, 0.0), AutomationPoint::linear(10, 1.0)],
            false,
        )
    }

    #[test]
    fn linear_ramp_interpolates() {
        let a = ramp();
        assert_eq!(a.value_at(0), Some(0.0));
        assert!((a.value_at(5).unwrap() - 0.5).abs() < 1e-6);
        assert_eq!(a.value_at(10), Some(1.0));
        assert_eq!(a.value_at(100), Some(1.0));
    }

    #[test]
    fn looping_wraps() {
        let mut a = ramp();
        a.looping = true;
        assert!((a.value_at(15).unwrap() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn step_holds_value() {
        let a = Automation::new(
            &[
                AutomationPoint { dt: 0, value: 0.25, curve: CurveKind::Step },
                AutomationPoint::linear(4, 0.75),
            ],
            false,
        );
        assert_eq!(a.value_at(3), Some(0.25));
        assert_eq!(a.value_at(4), Some(0.75));
    }

    #[test]
    fn empty_curve_has_no_value() {
        let a = Automation::new(&[], false);
        assert_eq!(a.value_at(0), None);
        assert_eq!(a.sample(8).count(), 0);
    }

    #[test]
    fn sample_uses_fixed_step_count() {
        let a = ramp();
        let points: alloc::vec::Vec<_> = a.sample(5).collect();
        assert_eq!(points.len(), 5);
        assert_eq!(points[0], (0, 0.0));
        assert_eq!(points[4].0, 8);
        assert_eq!(a.sample(0).count(), 0);
    }

    #[test]
    fn interpolate_exponential_degenerates_to_linear() {
        let v = interpolate(CurveKind::Exponential(0.0), 0.0, 1.0, 0.3);
        assert!((v - 0.3).abs() < 1e-6);
    }
}
