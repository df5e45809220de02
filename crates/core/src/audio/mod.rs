use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use hound::{SampleFormat, WavReader};
use tracing::{debug, info};

use crate::{AnalysisConfig, AnalysisResult, BeatDetector, BeatSyncError, Result};

/// PCM produced by an [`AudioSource`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedAudio {
    pub sample_rate: u32,
    /// One buffer per channel, samples normalised to `[-1, 1]`.
    pub channels: Vec<Vec<f32>>,
    /// Length in seconds as reported by the decoder.
    pub duration: f64,
}

impl DecodedAudio {
    /// Channel 0, which is all the analysis looks at.
    pub fn mono(&self) -> &[f32] {
        self.channels.first().map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Fetches and decodes an audio resource.
///
/// Implementations block; [`analyze_source`] calls them from a worker
/// thread so playback ticks keep flowing.
pub trait AudioSource: Send + Sync + 'static {
    /// Identifier the analysis is cached under, such as a resolved URL.
    fn key(&self) -> String;

    /// Fetch failures map to [`BeatSyncError::SourceUnavailable`], bad
    /// containers or codecs to [`BeatSyncError::Decode`].
    fn fetch_and_decode(&self) -> Result<DecodedAudio>;
}

/// WAV file on the local filesystem.
#[derive(Debug, Clone)]
pub struct WavFileSource {
    path: PathBuf,
}

impl WavFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AudioSource for WavFileSource {
    fn key(&self) -> String {
        std::fs::canonicalize(&self.path)
            .unwrap_or_else(|_| self.path.clone())
            .display()
            .to_string()
    }

    fn fetch_and_decode(&self) -> Result<DecodedAudio> {
        if !self.path.is_file() {
            return Err(BeatSyncError::SourceUnavailable(format!(
                "`{}` does not exist",
                self.path.display()
            )));
        }

        let reader = WavReader::open(&self.path)?;
        let spec = reader.spec();
        let channel_count = usize::from(spec.channels.max(1));

        let interleaved: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<std::result::Result<_, _>>()?,
            SampleFormat::Int => {
                let scale = (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|sample| sample.map(|value| value as f32 / scale))
                    .collect::<std::result::Result<_, _>>()?
            }
        };

        let mut channels = vec![Vec::with_capacity(interleaved.len() / channel_count); channel_count];
        for (index, sample) in interleaved.into_iter().enumerate() {
            channels[index % channel_count].push(sample);
        }

        let frames = channels.first().map(Vec::len).unwrap_or(0);
        let duration = if spec.sample_rate == 0 {
            0.0
        } else {
            frames as f64 / spec.sample_rate as f64
        };

        debug!(
            path = %self.path.display(),
            sample_rate = spec.sample_rate,
            channels = channel_count,
            frames,
            "decoded wav file"
        );

        Ok(DecodedAudio {
            sample_rate: spec.sample_rate,
            channels,
            duration,
        })
    }
}

/// Already decoded PCM kept in memory.
#[derive(Clone)]
pub struct PcmSource {
    key: String,
    audio: Arc<DecodedAudio>,
}

impl PcmSource {
    pub fn new(key: impl Into<String>, audio: DecodedAudio) -> Self {
        Self {
            key: key.into(),
            audio: Arc::new(audio),
        }
    }

    /// Mono buffer whose duration is derived from its length.
    pub fn mono(key: impl Into<String>, sample_rate: u32, samples: Vec<f32>) -> Self {
        let duration = if sample_rate == 0 {
            0.0
        } else {
            samples.len() as f64 / sample_rate as f64
        };
        Self::new(
            key,
            DecodedAudio {
                sample_rate,
                channels: vec![samples],
                duration,
            },
        )
    }
}

impl AudioSource for PcmSource {
    fn key(&self) -> String {
        self.key.clone()
    }

    fn fetch_and_decode(&self) -> Result<DecodedAudio> {
        Ok(self.audio.as_ref().clone())
    }
}

impl fmt::Debug for PcmSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PcmSource")
            .field("key", &self.key)
            .field("sample_rate", &self.audio.sample_rate)
            .field("duration", &self.audio.duration)
            .finish()
    }
}

/// Decodes `source` and runs the detector over channel 0 on the blocking
/// pool. Either the whole analysis succeeds or a typed error is returned;
/// partial beat lists are never produced.
pub async fn analyze_source(
    source: Arc<dyn AudioSource>,
    config: AnalysisConfig,
) -> Result<AnalysisResult> {
    let key = source.key();
    let result = tokio::task::spawn_blocking(move || {
        let audio = source.fetch_and_decode()?;
        let mut detector = BeatDetector::new(config)?;
        detector.analyze_with_duration(audio.mono(), audio.sample_rate, audio.duration)
    })
    .await
    .map_err(|err| BeatSyncError::msg(format!("analysis task for `{key}` aborted: {err}")))??;

    info!(
        key = %key,
        beats = result.beats().len(),
        duration = result.duration(),
        "audio analysis complete"
    );
    Ok(result)
}
