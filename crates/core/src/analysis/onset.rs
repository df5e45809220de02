use std::collections::VecDeque;

use crate::{AnalysisConfig, Beat, FrameFeatures};

/// Adaptive-threshold peak picker over the spectral flux signal.
///
/// A single forward pass: frames must be fed in order, and a detector that
/// has seen a buffer cannot be rewound. Use a fresh detector per analysis.
#[derive(Debug, Clone)]
pub struct OnsetDetector {
    sample_rate: u32,
    history: VecDeque<f32>,
    history_len: usize,
    previous_flux: f32,
    threshold_multiplier: f32,
    noise_floor: f32,
    last_timestamp: Option<f64>,
}

impl OnsetDetector {
    pub fn new(sample_rate: u32, config: &AnalysisConfig) -> Self {
        Self {
            sample_rate,
            history: VecDeque::with_capacity(config.history_len + 1),
            history_len: config.history_len.max(1),
            previous_flux: 0.0,
            threshold_multiplier: config.threshold_multiplier,
            noise_floor: config.noise_floor,
            last_timestamp: None,
        }
    }

    /// Feeds the next frame and returns a beat when the frame is a confirmed
    /// flux peak.
    pub fn push(&mut self, frame: &FrameFeatures) -> Option<Beat> {
        let flux = frame.spectral_flux;

        self.history.push_back(flux);
        if self.history.len() > self.history_len {
            self.history.pop_front();
        }

        let earlier_max = self
            .history
            .iter()
            .rev()
            .skip(1)
            .copied()
            .fold(f32::NEG_INFINITY, f32::max);
        let is_peak = flux > self.previous_flux && flux > earlier_max;
        self.previous_flux = flux;

        if !is_peak {
            return None;
        }

        let mean = self.history.iter().sum::<f32>() / self.history.len() as f32;
        let threshold = mean * self.threshold_multiplier;
        if flux <= threshold || flux <= self.noise_floor {
            return None;
        }

        let timestamp = frame.start_sample as f64 / self.sample_rate as f64;
        // Frames arrive in order, so this only trips on misuse.
        if self.last_timestamp.is_some_and(|last| timestamp <= last) {
            return None;
        }
        self.last_timestamp = Some(timestamp);

        Some(Beat {
            timestamp,
            intensity: (frame.rms * 3.0).clamp(0.0, 1.0),
            bass_intensity: (frame.low_band_energy / 10.0).clamp(0.0, 1.0),
        })
    }

    /// Runs the detector over a complete feature sequence.
    pub fn detect_all(mut self, frames: &[FrameFeatures]) -> Vec<Beat> {
        frames.iter().filter_map(|frame| self.push(frame)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(index: usize, flux: f32) -> FrameFeatures {
        FrameFeatures {
            start_sample: index * 512,
            spectral_flux: flux,
            rms: 0.2,
            low_band_energy: 4.0,
        }
    }

    fn detector() -> OnsetDetector {
        OnsetDetector::new(1_000, &AnalysisConfig::default())
    }

    #[test]
    fn isolated_spike_after_quiet_frames_is_a_beat() {
        let mut detector = detector();
        for i in 0..5 {
            assert!(detector.push(&frame(i, 0.02)).is_none());
        }

        let beat = detector.push(&frame(5, 0.5)).expect("spike should be a beat");
        assert!((beat.timestamp - 2.56).abs() < 1e-9);
        assert!((beat.intensity - 0.6).abs() < 1e-6);
        assert!((beat.bass_intensity - 0.4).abs() < 1e-6);
    }

    #[test]
    fn first_frame_alone_never_clears_the_threshold() {
        // With a single value in the history the mean equals the flux itself.
        assert!(detector().push(&frame(0, 1.0)).is_none());
    }

    #[test]
    fn peaks_below_noise_floor_are_ignored() {
        let mut detector = detector();
        for i in 0..5 {
            detector.push(&frame(i, 0.0));
        }
        assert!(detector.push(&frame(5, 0.009)).is_none());
    }

    #[test]
    fn peak_must_exceed_recent_history() {
        let mut detector = detector();
        let fluxes = [0.0, 0.0, 0.9, 0.1, 0.5];
        let beats: Vec<_> = fluxes
            .iter()
            .enumerate()
            .filter_map(|(i, flux)| detector.push(&frame(i, *flux)))
            .collect();

        // 0.5 rises over 0.1 but is still below the 0.9 peak in the history.
        assert_eq!(beats.len(), 1);
        assert!((beats[0].timestamp - 1.024).abs() < 1e-9);
    }

    #[test]
    fn loud_frames_saturate_intensities() {
        let mut detector = detector();
        detector.push(&frame(0, 0.0));
        let beat = detector
            .push(&FrameFeatures {
                start_sample: 512,
                spectral_flux: 0.8,
                rms: 0.9,
                low_band_energy: 42.0,
            })
            .unwrap();

        assert_eq!(beat.intensity, 1.0);
        assert_eq!(beat.bass_intensity, 1.0);
    }

    #[test]
    fn output_is_strictly_increasing() {
        let fluxes = [0.0, 0.3, 0.0, 0.0, 0.0, 0.0, 0.6, 0.0, 0.0, 0.9, 0.0];
        let frames: Vec<_> = fluxes.iter().enumerate().map(|(i, f)| frame(i, *f)).collect();
        let beats = detector().detect_all(&frames);

        assert_eq!(beats.len(), 3);
        assert!(beats.windows(2).all(|pair| pair[0].timestamp < pair[1].timestamp));
    }
}
