//! Sound scopes: independent playback categories.

/// One of the independent voice spaces. Each scope keeps its own runtime
/// instances and never orders itself against the others.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SoundScope {
    Playback,
    Sequencer,
    Notation,
}

impl SoundScope {
    pub const COUNT: usize = 3;

    pub const ALL: [SoundScope; Self::COUNT] =
        [SoundScope::Playback, SoundScope::Sequencer, SoundScope::Notation];

    /// Stable index, used for per-scope arrays.
    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            SoundScope::Playback => "playback",
            SoundScope::Sequencer => "sequencer",
            SoundScope::Notation => "notation",
        }
    }
}

/// A set of scopes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ScopeMask(u8);

impl ScopeMask {
    pub const NONE: ScopeMask = ScopeMask(0);
    pub const ALL: ScopeMask = ScopeMask(0b111);

    pub const fn only(scope: SoundScope) -> Self {
        ScopeMask(1 << scope as u8)
    }

    pub const fn with(self, scope: SoundScope) -> Self {
        ScopeMask(self.0 | (1 << scope as u8))
    }

    pub const fn without(self, scope: SoundScope) -> Self {
        ScopeMask(self.0 & !(1 << scope as u8))
    }

    pub const fn contains(self, scope: SoundScope) -> bool {
        self.0 & (1 << scope as u8) != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}
