use std::{f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};

use crate::{AnalysisConfig, BeatSyncError, Result};

/// Features of one analysis frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameFeatures {
    /// Index of the first sample of the frame.
    pub start_sample: usize,
    /// Half-wave rectified difference to the previous frame's magnitudes.
    pub spectral_flux: f32,
    pub rms: f32,
    /// Energy of the bins below the low band cutoff.
    pub low_band_energy: f32,
}

/// Splits a mono buffer into overlapping Hann-windowed frames and computes
/// [`FrameFeatures`] for each.
///
/// The FFT plan and buffers are reused between calls; no spectral state is
/// carried from one [`FeatureExtractor::extract`] call to the next.
pub struct FeatureExtractor {
    frame_size: usize,
    hop_size: usize,
    low_band_cutoff_hz: f32,
    window: Vec<f32>,
    fft: FftResources,
}

impl FeatureExtractor {
    pub fn new(config: &AnalysisConfig) -> Result<Self> {
        config.validate()?;

        let frame_size = config.frame_size;
        let window = (0..frame_size).map(|i| hann_value(i, frame_size)).collect();

        Ok(Self {
            frame_size,
            hop_size: config.hop_size,
            low_band_cutoff_hz: config.low_band_cutoff_hz,
            window,
            fft: FftResources::new(frame_size),
        })
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    /// Runs one pass over `samples`. Buffers shorter than a frame yield no
    /// features.
    pub fn extract(&mut self, samples: &[f32], sample_rate: u32) -> Result<Vec<FrameFeatures>> {
        if sample_rate == 0 {
            return Err(BeatSyncError::invalid("sample rate must be positive"));
        }

        let bins = self.frame_size / 2 + 1;
        let bin_hz = sample_rate as f32 / self.frame_size as f32;
        let low_bins = ((self.low_band_cutoff_hz / bin_hz).floor() as usize).clamp(1, bins - 1);
        let norm = self.frame_size as f32;

        let mut previous = vec![0.0_f32; bins];
        let mut current = vec![0.0_f32; bins];
        let mut frames = Vec::new();

        let mut start = 0;
        while start + self.frame_size <= samples.len() {
            let frame = &samples[start..start + self.frame_size];

            for ((slot, sample), weight) in self.fft.input.iter_mut().zip(frame).zip(&self.window) {
                *slot = sample * weight;
            }
            self.fft
                .plan
                .process_with_scratch(&mut self.fft.input, &mut self.fft.spectrum, &mut self.fft.scratch)
                .map_err(|err| BeatSyncError::msg(format!("fft failed: {err}")))?;

            for (magnitude, bin) in current.iter_mut().zip(&self.fft.spectrum) {
                *magnitude = bin.norm() / norm;
            }

            let spectral_flux = current
                .iter()
                .zip(&previous)
                .map(|(now, before)| (now - before).max(0.0))
                .sum();

            // DC is an offset, not bass.
            let low_band_energy = 2.0
                * self.fft.spectrum[1..=low_bins]
                    .iter()
                    .map(Complex32::norm_sqr)
                    .sum::<f32>()
                / norm;

            frames.push(FrameFeatures {
                start_sample: start,
                spectral_flux,
                rms: compute_rms(frame),
                low_band_energy,
            });

            std::mem::swap(&mut previous, &mut current);
            start += self.hop_size;
        }

        Ok(frames)
    }
}

impl fmt::Debug for FeatureExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureExtractor")
            .field("frame_size", &self.frame_size)
            .field("hop_size", &self.hop_size)
            .field("low_band_cutoff_hz", &self.low_band_cutoff_hz)
            .finish()
    }
}

struct FftResources {
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
}

impl FftResources {
    fn new(size: usize) -> Self {
        let plan = RealFftPlanner::<f32>::new().plan_fft_forward(size);
        Self {
            scratch: plan.make_scratch_vec(),
            spectrum: plan.make_output_vec(),
            input: plan.make_input_vec(),
            plan,
        }
    }
}

pub(crate) fn compute_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|sample| sample * sample).sum();
    (sum / samples.len() as f32).sqrt()
}

fn hann_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    0.5 - 0.5 * ((2.0 * PI * index as f32) / (len as f32 - 1.0)).cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> FeatureExtractor {
        FeatureExtractor::new(&AnalysisConfig::default()).unwrap()
    }

    fn sine(freq: f32, amplitude: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| amplitude * (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn frames_step_by_hop_size() {
        let frames = extractor().extract(&vec![0.0; 4096], 44_100).unwrap();
        // (4096 - 1024) / 512 + 1
        assert_eq!(frames.len(), 7);
        assert_eq!(frames[1].start_sample, 512);
        assert_eq!(frames.last().unwrap().start_sample, 3072);
    }

    #[test]
    fn short_buffers_yield_nothing() {
        assert!(extractor().extract(&[0.5; 1023], 44_100).unwrap().is_empty());
    }

    #[test]
    fn silence_has_no_features() {
        for frame in extractor().extract(&vec![0.0; 2048], 44_100).unwrap() {
            assert_eq!(frame.spectral_flux, 0.0);
            assert_eq!(frame.rms, 0.0);
            assert_eq!(frame.low_band_energy, 0.0);
        }
    }

    #[test]
    fn steady_tone_has_flux_only_on_first_frame() {
        let frames = extractor()
            .extract(&sine(441.0, 0.5, 44_100, 44_100 / 10), 44_100)
            .unwrap();

        assert!(frames[0].spectral_flux > 0.01);
        // Later frames see nearly the same spectrum as their predecessor.
        assert!(frames[3].spectral_flux < frames[0].spectral_flux * 0.25);
        assert!((frames[3].rms - 0.5 / 2.0_f32.sqrt()).abs() < 0.02);
    }

    #[test]
    fn bass_lands_in_the_low_band() {
        let mut extractor = extractor();
        let bass = extractor.extract(&sine(80.0, 0.5, 44_100, 2048), 44_100).unwrap();
        let treble = extractor.extract(&sine(5_000.0, 0.5, 44_100, 2048), 44_100).unwrap();

        assert!(bass[0].low_band_energy > 1.0);
        assert!(treble[0].low_band_energy < bass[0].low_band_energy * 0.01);
    }

    #[test]
    fn zero_sample_rate_is_rejected() {
        assert!(extractor().extract(&[0.0; 2048], 0).is_err());
    }
}
