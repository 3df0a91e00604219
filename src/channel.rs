//! Channel roles and loudness weighting.
//!
//! Each input channel carries a semantic role that determines its weight in
//! the ITU-R BS.1770 energy sum. Surround channels are boosted by +1.5 dB
//! (factor 1.41), unused channels (such as LFE) are excluded, and a dual-mono
//! channel counts twice.

use std::fmt;

/// Semantic role of one input channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChannelRole {
    /// Channel excluded from the loudness measurement (for example LFE).
    #[default]
    Unused,
    /// Left channel.
    Left,
    /// Right channel.
    Right,
    /// Center channel.
    Center,
    /// Left surround channel (+1.5 dB weight).
    LeftSurround,
    /// Right surround channel (+1.5 dB weight).
    RightSurround,
    /// A mono channel that is counted twice.
    DualMono,
}

impl ChannelRole {
    /// Weight of this role in the channel energy sum.
    #[inline]
    pub fn weight(self) -> f64 {
        match self {
            Self::Unused => 0.0,
            Self::Left | Self::Right | Self::Center => 1.0,
            Self::LeftSurround | Self::RightSurround => 1.41,
            Self::DualMono => 2.0,
        }
    }
}

impl fmt::Display for ChannelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unused => write!(f, "unused"),
            Self::Left => write!(f, "left"),
            Self::Right => write!(f, "right"),
            Self::Center => write!(f, "center"),
            Self::LeftSurround => write!(f, "left surround"),
            Self::RightSurround => write!(f, "right surround"),
            Self::DualMono => write!(f, "dual mono"),
        }
    }
}

/// Build the default channel map for a given channel count.
///
/// The first six indices follow the 5.1 convention (L, R, C, LFE, Ls, Rs);
/// any further channels default to unused.
pub(crate) fn default_map(channels: u32) -> Vec<ChannelRole> {
    (0..channels)
        .map(|i| match i {
            0 => ChannelRole::Left,
            1 => ChannelRole::Right,
            2 => ChannelRole::Center,
            3 => ChannelRole::Unused,
            4 => ChannelRole::LeftSurround,
            5 => ChannelRole::RightSurround,
            _ => ChannelRole::Unused,
        })
        .collect()
}
