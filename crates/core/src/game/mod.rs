mod model;

use std::fmt;

pub use model::GameModel;

/// Jammer's knowledge of the transmitter's channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum State {
    /// The jammer does not know the current channel (`"j"`).
    Unknown,
    /// The transmitter has survived this many consecutive turns on one channel.
    Undetected(usize),
}

impl State {
    /// Consecutive undetected transmissions; `Unknown` counts as zero.
    #[must_use]
    pub const fn consecutive(self) -> usize {
        match self {
            Self::Unknown => 0,
            Self::Undetected(x) => x,
        }
    }

    #[must_use]
    pub const fn is_unknown(self) -> bool {
        matches!(self, Self::Unknown)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "j"),
            Self::Undetected(x) => write!(f, "{x}"),
        }
    }
}

/// Transmitter action: keep or change channel, at a given rate index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Stay(usize),
    Hop(usize),
}

impl Action {
    #[must_use]
    pub const fn rate_index(self) -> usize {
        match self {
            Self::Stay(r) | Self::Hop(r) => r,
        }
    }

    #[must_use]
    pub const fn is_hop(self) -> bool {
        matches!(self, Self::Hop(_))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stay(r) => write!(f, "stay_{r}"),
            Self::Hop(r) => write!(f, "hop_{r}"),
        }
    }
}
