use std::sync::Arc;

use tokio::time::Instant;
use tracing::trace;

use crate::{AnalysisResult, Beat, PulseParams, PulseWindow, SyncConfig, VisualizerConfig};

/// Pulse bookkeeping of one editing session.
#[derive(Debug, Clone)]
pub struct PulseState {
    /// Beat within tolerance of the latest sample, if any.
    pub active_beat: Option<Beat>,
    /// Timestamp of the beat that fired the latest rising edge.
    pub last_pulsed_timestamp: Option<f64>,
    window: PulseWindow<PulseParams>,
}

impl PulseState {
    fn new(config: &SyncConfig) -> Self {
        Self {
            active_beat: None,
            last_pulsed_timestamp: None,
            window: PulseWindow::new(PulseParams::NEUTRAL, config.pulse_duration()),
        }
    }

    pub fn expires_at(&self) -> Option<Instant> {
        self.window.expires_at()
    }

    /// Parameters in effect at `now`; neutral once the window has run out.
    pub fn params_at(&self, now: Instant) -> PulseParams {
        self.window.value_at(now)
    }

    pub fn is_pulsing(&self, now: Instant) -> bool {
        self.window.is_active(now)
    }
}

/// A rising edge: playback reached a beat that has not pulsed yet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PulseEvent {
    pub beat: Beat,
    pub params: PulseParams,
    pub expires_at: Instant,
}

/// Turns a stream of playback positions into edge-triggered beat pulses.
///
/// Samples may arrive at any interval. A jump backwards by more than the
/// tolerance counts as a seek and lets already pulsed beats fire again.
#[derive(Debug, Clone)]
pub struct PlaybackSynchronizer {
    analysis: Arc<AnalysisResult>,
    tolerance: f64,
    sync_intensity: f32,
    enabled: bool,
    last_sample: Option<f64>,
    state: PulseState,
}

impl PlaybackSynchronizer {
    pub fn new(sync: &SyncConfig, visualizer: &VisualizerConfig) -> Self {
        Self {
            analysis: Arc::new(AnalysisResult::empty()),
            tolerance: sync.tolerance_seconds,
            sync_intensity: visualizer.sync_intensity,
            enabled: visualizer.beat_sync_enabled,
            last_sample: None,
            state: PulseState::new(sync),
        }
    }

    /// Swaps in a new beat sequence and forgets all pulse history.
    pub fn set_analysis(&mut self, analysis: Arc<AnalysisResult>) {
        self.analysis = analysis;
        self.reset();
    }

    pub fn beats(&self) -> &[Beat] {
        self.analysis.beats()
    }

    pub fn set_sync_intensity(&mut self, sync_intensity: f32) {
        self.sync_intensity = sync_intensity;
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.state.active_beat = None;
            self.state.window.reset();
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn state(&self) -> &PulseState {
        &self.state
    }

    pub fn reset(&mut self) {
        self.last_sample = None;
        self.state.active_beat = None;
        self.state.last_pulsed_timestamp = None;
        self.state.window.reset();
    }

    /// Earliest beat strictly within the tolerance of `current_time`.
    pub fn active_beat_at(&self, current_time: f64) -> Option<Beat> {
        if !self.enabled {
            return None;
        }
        let beats = self.analysis.beats();
        let first = beats.partition_point(|beat| beat.timestamp <= current_time - self.tolerance);
        beats
            .get(first)
            .filter(|beat| (current_time - beat.timestamp).abs() < self.tolerance)
            .copied()
    }

    /// Feeds one playback position. Returns the pulse when this sample is a
    /// rising edge; polling again inside the same beat's window returns
    /// `None`.
    pub fn observe(&mut self, current_time: f64, now: Instant) -> Option<PulseEvent> {
        if self
            .last_sample
            .is_some_and(|last| last - current_time > self.tolerance)
        {
            trace!(from = ?self.last_sample, to = current_time, "seek detected");
            self.state.last_pulsed_timestamp = None;
        }
        self.last_sample = Some(current_time);

        let active = self.active_beat_at(current_time);
        self.state.active_beat = active;

        let beat = active?;
        if self.state.last_pulsed_timestamp == Some(beat.timestamp) {
            return None;
        }

        self.state.last_pulsed_timestamp = Some(beat.timestamp);
        let params = PulseParams::from_beat(&beat, self.sync_intensity);
        let expires_at = self.state.window.trigger(params, now);
        trace!(timestamp = beat.timestamp, current_time, "beat rising edge");

        Some(PulseEvent {
            beat,
            params,
            expires_at,
        })
    }
}
