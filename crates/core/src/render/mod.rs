use serde::Serialize;

use crate::{AnnotationStore, Beat, FrameParameters, Result, TimelineCommand};

/// Marker drawn on the timeline for one beat.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BeatMarker {
    pub timestamp: f64,
    /// Horizontal position as a fraction of the timeline width.
    pub position: f64,
    pub size_px: f32,
    /// Bass-heavy beats are drawn larger and in the accent colour.
    pub bass_emphasis: bool,
    /// Playback is currently at this beat.
    pub active: bool,
    pub command: Option<TimelineCommand>,
}

impl BeatMarker {
    pub fn new(beat: &Beat, duration: f64, active: bool, command: Option<TimelineCommand>) -> Self {
        let bass_emphasis = beat.bass_intensity > 0.5;
        let multiplier = if bass_emphasis { 1.2 } else { 1.0 };
        Self {
            timestamp: beat.timestamp,
            position: fraction(beat.timestamp, duration),
            size_px: (8.0 + (beat.intensity - 0.5) * 12.0) * multiplier,
            bass_emphasis,
            active,
            command,
        }
    }
}

/// Timeline strip contents for one frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TimelineOverlay {
    /// Playhead position as a fraction of the timeline width.
    pub playhead: f64,
    /// Empty while beat sync is switched off.
    pub markers: Vec<BeatMarker>,
}

impl TimelineOverlay {
    pub fn build(
        beats: &[Beat],
        annotations: &AnnotationStore,
        current_time: f64,
        duration: f64,
        active: Option<&Beat>,
        beat_sync_enabled: bool,
    ) -> Self {
        let markers = if beat_sync_enabled {
            beats
                .iter()
                .map(|beat| {
                    let is_active = active.is_some_and(|a| a.timestamp == beat.timestamp);
                    BeatMarker::new(beat, duration, is_active, annotations.get(beat.timestamp))
                })
                .collect()
        } else {
            Vec::new()
        };

        Self {
            playhead: fraction(current_time, duration),
            markers,
        }
    }
}

/// Playback time under a pointer at `ratio` of the timeline width.
pub fn time_from_pointer(ratio: f64, duration: f64) -> f64 {
    ratio.clamp(0.0, 1.0) * duration.max(0.0)
}

fn fraction(time: f64, duration: f64) -> f64 {
    if duration > 0.0 {
        time / duration
    } else {
        0.0
    }
}

/// Rendering collaborator. Receives one call per drawn frame.
pub trait RenderSink {
    fn draw(&mut self, frame: &FrameParameters, overlay: &TimelineOverlay) -> Result<()>;
}

/// Sink that keeps the frames it was given, for previews and tests.
#[derive(Debug, Default)]
pub struct FrameLog {
    frames: Vec<(FrameParameters, TimelineOverlay)>,
}

impl FrameLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> &[(FrameParameters, TimelineOverlay)] {
        &self.frames
    }

    pub fn last(&self) -> Option<&(FrameParameters, TimelineOverlay)> {
        self.frames.last()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

impl RenderSink for FrameLog {
    fn draw(&mut self, frame: &FrameParameters, overlay: &TimelineOverlay) -> Result<()> {
        self.frames.push((*frame, overlay.clone()));
        Ok(())
    }
}
