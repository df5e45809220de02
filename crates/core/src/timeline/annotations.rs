use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::BeatSyncError;

/// Edit commands a creator can pin to a beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimelineCommand {
    ZoomIn,
    QuickCut,
    PanLeft,
    DofBlur,
    Explosion,
}

impl TimelineCommand {
    pub const ALL: [TimelineCommand; 5] = [
        Self::ZoomIn,
        Self::QuickCut,
        Self::PanLeft,
        Self::DofBlur,
        Self::Explosion,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::ZoomIn => "Zoom In",
            Self::QuickCut => "Quick Cut",
            Self::PanLeft => "Pan Left",
            Self::DofBlur => "DoF Blur",
            Self::Explosion => "Explosion",
        }
    }

    /// Glyph drawn above the beat marker.
    pub fn icon(self) -> &'static str {
        match self {
            Self::ZoomIn => "🔍",
            Self::QuickCut => "✂️",
            Self::PanLeft => "⬅️",
            Self::DofBlur => "💧",
            Self::Explosion => "💥",
        }
    }
}

impl fmt::Display for TimelineCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TimelineCommand {
    type Err = BeatSyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|command| command.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| BeatSyncError::invalid(format!("unknown timeline command `{s}`")))
    }
}

/// Exact bit pattern of a beat timestamp. No rounding is applied, so only
/// the value produced by the detector finds its annotation again.
/// Non-negative timestamps order the same as their bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct TimestampKey(u64);

impl From<f64> for TimestampKey {
    fn from(value: f64) -> Self {
        Self(value.to_bits())
    }
}

/// Commands pinned to beats for one project.
#[derive(Debug, Clone, Default)]
pub struct AnnotationStore {
    entries: BTreeMap<TimestampKey, (f64, TimelineCommand)>,
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pins `command` to `timestamp`, returning the command it replaced.
    pub fn set(&mut self, timestamp: f64, command: TimelineCommand) -> Option<TimelineCommand> {
        self.entries
            .insert(timestamp.into(), (timestamp, command))
            .map(|(_, previous)| previous)
    }

    pub fn remove(&mut self, timestamp: f64) -> Option<TimelineCommand> {
        self.entries
            .remove(&TimestampKey::from(timestamp))
            .map(|(_, command)| command)
    }

    pub fn get(&self, timestamp: f64) -> Option<TimelineCommand> {
        self.entries
            .get(&TimestampKey::from(timestamp))
            .map(|(_, command)| *command)
    }

    /// Applies a selection from the command menu; `None` clears the beat.
    pub fn apply(&mut self, timestamp: f64, selection: Option<TimelineCommand>) {
        match selection {
            Some(command) => {
                self.set(timestamp, command);
            }
            None => {
                self.remove(timestamp);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, TimelineCommand)> + '_ {
        self.entries.values().copied()
    }
}
