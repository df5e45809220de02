//! Onset analysis: turns a mono PCM buffer into an ordered list of beats.
//!
//! The work is split in two stages. [`FeatureExtractor`] computes spectral
//! flux, RMS and low-band energy for overlapping frames; [`OnsetDetector`]
//! picks flux peaks above an adaptive threshold and emits [`Beat`]s. Tempo
//! estimation is not attempted; only transients are reported.

mod features;
mod onset;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub use features::{FeatureExtractor, FrameFeatures};
pub use onset::OnsetDetector;

use crate::{AnalysisConfig, BeatSyncError, Result};

/// A detected transient.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Beat {
    /// Start of the frame the onset was found in, in seconds.
    pub timestamp: f64,
    /// Overall strength in `[0, 1]`.
    pub intensity: f32,
    /// Low-band strength in `[0, 1]`.
    pub bass_intensity: f32,
}

/// Outcome of analysing one audio resource. Never mutated once built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    beats: Vec<Beat>,
    duration: f64,
}

impl AnalysisResult {
    /// Builds a result, checking the beat ordering and duration invariants.
    pub fn new(beats: Vec<Beat>, duration: f64) -> Result<Self> {
        if !(duration.is_finite() && duration >= 0.0) {
            return Err(BeatSyncError::invalid(format!(
                "audio duration must be non-negative, got {duration}"
            )));
        }
        if beats.iter().any(|beat| !(beat.timestamp >= 0.0)) {
            return Err(BeatSyncError::invalid("beat timestamps must be non-negative"));
        }
        if beats.windows(2).any(|pair| pair[0].timestamp >= pair[1].timestamp) {
            return Err(BeatSyncError::invalid(
                "beat timestamps must be strictly increasing",
            ));
        }
        Ok(Self { beats, duration })
    }

    /// Result for a silent or zero-length resource.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn beats(&self) -> &[Beat] {
        &self.beats
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn is_empty(&self) -> bool {
        self.beats.is_empty()
    }
}

/// Feature extraction and onset detection bundled for one-shot use.
#[derive(Debug)]
pub struct BeatDetector {
    config: AnalysisConfig,
    extractor: FeatureExtractor,
}

impl BeatDetector {
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        let extractor = FeatureExtractor::new(&config)?;
        Ok(Self { config, extractor })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Runs a full forward pass over `samples`. Calling it again with the
    /// same buffer repeats the whole pass and yields the same beats.
    pub fn detect(&mut self, samples: &[f32], sample_rate: u32) -> Result<Vec<Beat>> {
        let frames = self.extractor.extract(samples, sample_rate)?;
        let beats = OnsetDetector::new(sample_rate, &self.config).detect_all(&frames);
        debug!(
            frames = frames.len(),
            beats = beats.len(),
            sample_rate,
            "onset detection pass finished"
        );
        Ok(beats)
    }

    /// Detects beats and pairs them with the buffer duration.
    pub fn analyze(&mut self, samples: &[f32], sample_rate: u32) -> Result<AnalysisResult> {
        if sample_rate == 0 {
            return Err(BeatSyncError::invalid("sample rate must be positive"));
        }
        let duration = samples.len() as f64 / sample_rate as f64;
        self.analyze_with_duration(samples, sample_rate, duration)
    }

    /// Like [`BeatDetector::analyze`] but trusts a duration reported by the
    /// decoder, which may include padding the PCM buffer lacks.
    pub fn analyze_with_duration(
        &mut self,
        samples: &[f32],
        sample_rate: u32,
        duration: f64,
    ) -> Result<AnalysisResult> {
        if samples.is_empty() {
            return AnalysisResult::new(Vec::new(), duration);
        }
        let beats = self.detect(samples, sample_rate)?;
        AnalysisResult::new(beats, duration)
    }
}
