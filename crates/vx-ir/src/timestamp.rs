//! Time representation with sub-tick precision.

/// Position on the transport.
///
/// Ticks are sixteenth notes; `subtick` subdivides a tick into 65536 parts so a
/// voice can start between two buffer boundaries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    /// Absolute tick from transport start
    pub tick: u64,
    /// 0-65535 subdivision within the tick
    pub subtick: u16,
}

impl Timestamp {
    /// Create a timestamp at an exact tick boundary.
    pub const fn from_ticks(tick: u64) -> Self {
        Self { tick, subtick: 0 }
    }

    /// Create a timestamp with a fractional offset within a tick.
    ///
    /// `fraction` should be in the range [0.0, 1.0).
    pub fn with_offset(tick: u64, fraction: f32) -> Self {
        Self {
            tick,
            subtick: (fraction.clamp(0.0, 0.99999) * 65536.0) as u16,
        }
    }

    /// Add ticks to this timestamp.
    pub const fn add_ticks(self, ticks: u64) -> Self {
        Self {
            tick: self.tick + ticks,
            subtick: self.subtick,
        }
    }

    /// Convert to a frame position given (fractional) frames per tick.
    pub fn to_frames(self, frames_per_tick: f64) -> u64 {
        let exact = (self.tick as f64 + self.subtick as f64 / 65536.0) * frames_per_tick;
        libm::floor(exact) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_ordering() {
        let t1 = Timestamp::from_ticks(10);
        let t2 = Timestamp::from_ticks(20);
        let t3 = Timestamp::with_offset(10, 0.5);

        assert!(t1 < t2);
        assert!(t1 < t3);
        assert!(t3 < t2);
    }

    #[test]
    fn to_frames() {
        let t = Timestamp::from_ticks(10);
        assert_eq!(t.to_frames(100.0), 1000);

        let t_half = Timestamp::with_offset(10, 0.5);
        assert_eq!(t_half.to_frames(100.0), 1050);
    }

    #[test]
    fn fractional_frames_per_tick_floor() {
        assert_eq!(Timestamp::from_ticks(3).to_frames(2.5), 7);
    }
}
