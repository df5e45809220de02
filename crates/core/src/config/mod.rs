use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{BeatSyncError, Result, VisualizerColor, VisualizerStyle};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub analysis: AnalysisConfig,
    pub sync: SyncConfig,
    pub visualizer: VisualizerConfig,
}

impl AppConfig {
    /// Reads a JSON configuration file. Missing sections fall back to their
    /// defaults; the result is validated before it is returned.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|err| {
            BeatSyncError::invalid(format!(
                "cannot read config `{}`: {err}",
                path.as_ref().display()
            ))
        })?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.analysis.validate()?;
        self.sync.validate()?;
        self.visualizer.validate()
    }
}

/// Parameters of the feature extractor and onset detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub frame_size: usize,
    pub hop_size: usize,
    /// Number of flux values kept for the adaptive threshold.
    pub history_len: usize,
    pub threshold_multiplier: f32,
    /// Flux below this is treated as silence.
    pub noise_floor: f32,
    /// Upper edge of the band summed into the bass energy.
    pub low_band_cutoff_hz: f32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            frame_size: 1024,
            hop_size: 512,
            history_len: 10,
            threshold_multiplier: 1.5,
            noise_floor: 0.01,
            low_band_cutoff_hz: 250.0,
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<()> {
        if self.frame_size < 2 {
            return Err(BeatSyncError::invalid("frame size must be at least 2 samples"));
        }
        if self.hop_size == 0 || self.hop_size > self.frame_size {
            return Err(BeatSyncError::invalid(format!(
                "hop size {} must be within 1..={}",
                self.hop_size, self.frame_size
            )));
        }
        if self.history_len == 0 {
            return Err(BeatSyncError::invalid("flux history must hold at least one value"));
        }
        if !(self.threshold_multiplier.is_finite() && self.threshold_multiplier > 0.0) {
            return Err(BeatSyncError::invalid("threshold multiplier must be positive"));
        }
        if !(self.noise_floor.is_finite() && self.noise_floor >= 0.0) {
            return Err(BeatSyncError::invalid("noise floor must be non-negative"));
        }
        if !(self.low_band_cutoff_hz.is_finite() && self.low_band_cutoff_hz > 0.0) {
            return Err(BeatSyncError::invalid("low band cutoff must be positive"));
        }
        Ok(())
    }
}

/// Timing of the playback synchronizer and the pulse windows it opens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Radius around a beat within which playback counts as "at" the beat.
    pub tolerance_seconds: f64,
    /// General cross-component pulse.
    pub pulse_duration_ms: u64,
    /// Scale pulse of the waveform variant.
    pub waveform_pulse_ms: u64,
    /// Scale pulse of the burst variants.
    pub burst_pulse_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tolerance_seconds: 0.1,
            pulse_duration_ms: 400,
            waveform_pulse_ms: 150,
            burst_pulse_ms: 300,
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.tolerance_seconds.is_finite() && self.tolerance_seconds > 0.0) {
            return Err(BeatSyncError::invalid("sync tolerance must be positive"));
        }
        if self.pulse_duration_ms == 0 || self.waveform_pulse_ms == 0 || self.burst_pulse_ms == 0 {
            return Err(BeatSyncError::invalid("pulse windows must last at least 1ms"));
        }
        Ok(())
    }

    pub fn pulse_duration(&self) -> Duration {
        Duration::from_millis(self.pulse_duration_ms)
    }

    pub fn waveform_pulse(&self) -> Duration {
        Duration::from_millis(self.waveform_pulse_ms)
    }

    pub fn burst_pulse(&self) -> Duration {
        Duration::from_millis(self.burst_pulse_ms)
    }
}

/// User-facing visualizer controls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualizerConfig {
    /// 0-100, scales every beat-driven effect.
    pub sync_intensity: f32,
    /// 0-100, scales the waveform pulse.
    pub waveform_sensitivity: f32,
    /// 1-10, stroke width of the waveform.
    pub waveform_thickness: f32,
    pub color: VisualizerColor,
    pub style: VisualizerStyle,
    /// When off the synchronizer never reports an active beat.
    pub beat_sync_enabled: bool,
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self {
            sync_intensity: 50.0,
            waveform_sensitivity: 50.0,
            waveform_thickness: 3.0,
            color: VisualizerColor::default(),
            style: VisualizerStyle::default(),
            beat_sync_enabled: true,
        }
    }
}

impl VisualizerConfig {
    pub fn validate(&self) -> Result<()> {
        check_range("sync intensity", self.sync_intensity, 0.0, 100.0)?;
        check_range("waveform sensitivity", self.waveform_sensitivity, 0.0, 100.0)?;
        check_range("waveform thickness", self.waveform_thickness, 1.0, 10.0)
    }
}

fn check_range(name: &str, value: f32, min: f32, max: f32) -> Result<()> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(BeatSyncError::invalid(format!(
            "{name} {value} outside {min}..={max}"
        )))
    }
}
