use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::BeatSyncError;

/// Rendering variant drawn underneath the beat markers. Exactly one is active
/// at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum VisualizerStyle {
    /// Scrubbed continuously with playback, pulses on beats.
    #[default]
    Waveform,
    /// Burst animation restarted on each beat.
    Bars,
    /// Burst animation restarted on each beat.
    Particles,
}

impl VisualizerStyle {
    pub const ALL: [VisualizerStyle; 3] = [Self::Waveform, Self::Bars, Self::Particles];

    pub fn name(self) -> &'static str {
        match self {
            Self::Waveform => "Waveform",
            Self::Bars => "Bars",
            Self::Particles => "Particles",
        }
    }

    /// Event-driven variants restart a burst on every rising edge instead of
    /// following the playhead.
    pub fn is_event_driven(self) -> bool {
        !matches!(self, Self::Waveform)
    }
}

impl fmt::Display for VisualizerStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for VisualizerStyle {
    type Err = BeatSyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|style| style.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| BeatSyncError::invalid(format!("unknown visualizer style `{s}`")))
    }
}

/// Palette applied to the visualizer animation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum VisualizerColor {
    #[default]
    Amber,
    Aqua,
    Crimson,
}

impl VisualizerColor {
    pub const ALL: [VisualizerColor; 3] = [Self::Amber, Self::Aqua, Self::Crimson];

    pub fn name(self) -> &'static str {
        match self {
            Self::Amber => "Amber",
            Self::Aqua => "Aqua",
            Self::Crimson => "Crimson",
        }
    }

    /// CSS-style hex colour used by swatches.
    pub fn hex(self) -> &'static str {
        match self {
            Self::Amber => "#FBBF24",
            Self::Aqua => "#2DD4BF",
            Self::Crimson => "#F43F5E",
        }
    }

    /// Normalised `[r, g, b, a]` as stored in animation colour fields.
    pub fn rgba(self) -> [f64; 4] {
        match self {
            Self::Amber => [0.984, 0.749, 0.141, 1.0],
            Self::Aqua => [0.176, 0.831, 0.749, 1.0],
            Self::Crimson => [0.957, 0.247, 0.369, 1.0],
        }
    }
}

impl fmt::Display for VisualizerColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for VisualizerColor {
    type Err = BeatSyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|color| color.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| BeatSyncError::invalid(format!("unknown visualizer colour `{s}`")))
    }
}
