//! Unit conversion between a port's plain range and a normalized `[0, 1]` view.

/// How the plain range is spread over the normalized range.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Scale {
    Linear,
    /// Equal ratios per normalized step. Both bounds must be positive.
    Logarithmic,
}

/// Maps plain parameter units onto `[0, 1]` and back.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Conversion {
    pub lower: f64,
    pub upper: f64,
    pub scale: Scale,
}

impl Conversion {
    pub const fn linear(lower: f64, upper: f64) -> Self {
        Self {
            lower,
            upper,
            scale: Scale::Linear,
        }
    }

    pub const fn logarithmic(lower: f64, upper: f64) -> Self {
        Self {
            lower,
            upper,
            scale: Scale::Logarithmic,
        }
    }

    /// A zero-width range cannot be normalized.
    pub fn is_degenerate(&self) -> bool {
        match self.scale {
            Scale::Linear => self.upper == self.lower,
            Scale::Logarithmic => {
                self.upper == self.lower || self.lower <= 0.0 || self.upper <= 0.0
            }
        }
    }

    /// Normalized value to plain units. `None` for a degenerate range.
    pub fn to_plain(&self, normalized: f64) -> Option<f64> {
        if self.is_degenerate() {
            return None;
        }
        let n = normalized.clamp(0.0, 1.0);
        Some(match self.scale {
            Scale::Linear => self.lower + n * (self.upper - self.lower),
            Scale::Logarithmic => self.lower * libm::pow(self.upper / self.lower, n),
        })
    }

    /// Plain units to a normalized value. `None` for a degenerate range.
    pub fn to_normalized(&self, plain: f64) -> Option<f64> {
        if self.is_degenerate() {
            return None;
        }
        let n = match self.scale {
            Scale::Linear => (plain - self.lower) / (self.upper - self.lower),
            Scale::Logarithmic => {
                if plain <= 0.0 {
                    0.0
                } else {
                    libm::log(plain / self.lower) / libm::log(self.upper / self.lower)
                }
            }
        };
        Some(n.clamp(0.0, 1.0))
    }
}
