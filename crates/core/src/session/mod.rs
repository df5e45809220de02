//! Per-project editing session: owns the pulse state and annotations of the
//! open project and wires analysis results into the playback pipeline.

use std::{fmt, sync::Arc};

use futures::{future::BoxFuture, FutureExt};
use serde::Serialize;
use tokio::{sync::watch, time::Instant};
use tracing::{info, warn};

use crate::{
    analyze_source, AnalysisCache, AnalysisResult, AnnotationStore, AppConfig, AssetStore,
    AudioSource, Beat, FrameParameters, PlaybackSynchronizer, PulseDriver, PulseParams,
    PulseState, RenderSink, Result, TimelineCommand, TimelineOverlay, VisualModulator,
    VisualizerConfig,
};

/// Identifies the project an [`EditingSession`] is working on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ProjectId(u64);

impl ProjectId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "project-{}", self.0)
    }
}

/// Handed out when an analysis starts; the result is only applied if the
/// same project is still open when it arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisTicket {
    project: ProjectId,
    key: String,
}

impl AnalysisTicket {
    pub fn project(&self) -> ProjectId {
        self.project
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Pending analysis returned by [`EditingSession::request_analysis`].
pub type AnalysisRequest = BoxFuture<'static, Result<Arc<AnalysisResult>>>;

pub struct EditingSession {
    project: ProjectId,
    config: AppConfig,
    cache: AnalysisCache,
    assets: AssetStore,
    synchronizer: PlaybackSynchronizer,
    driver: PulseDriver<PulseParams>,
    modulator: VisualModulator,
    annotations: AnnotationStore,
    analysis: Arc<AnalysisResult>,
    media_duration: Option<f64>,
    error_message: Option<&'static str>,
}

impl EditingSession {
    /// Opens the first project. The cache is shared with whoever else the
    /// caller hands it to.
    pub fn new(config: AppConfig, cache: AnalysisCache) -> Result<Self> {
        config.validate()?;
        let assets = AssetStore::builtin()?;
        let modulator = VisualModulator::new(&config.visualizer, &config.sync, &assets)?;

        Ok(Self {
            project: ProjectId(0),
            synchronizer: PlaybackSynchronizer::new(&config.sync, &config.visualizer),
            driver: PulseDriver::new(PulseParams::NEUTRAL, config.sync.pulse_duration()),
            modulator,
            annotations: AnnotationStore::new(),
            analysis: Arc::new(AnalysisResult::empty()),
            media_duration: None,
            error_message: None,
            config,
            cache,
            assets,
        })
    }

    pub fn project(&self) -> ProjectId {
        self.project
    }

    /// Closes the current project and opens a fresh one. Beats, pulse state
    /// and annotations are discarded; analyses still running for the old
    /// project will be ignored when they complete.
    pub fn switch_project(&mut self) -> ProjectId {
        let previous = self.project;
        self.project = ProjectId(previous.0 + 1);

        self.analysis = Arc::new(AnalysisResult::empty());
        self.synchronizer.set_analysis(Arc::clone(&self.analysis));
        self.driver.reset();
        self.modulator.reset();
        self.annotations.clear();
        self.media_duration = None;
        self.error_message = None;

        info!(from = %previous, to = %self.project, "switched project");
        self.project
    }

    pub fn begin_analysis(&self, key: impl Into<String>) -> AnalysisTicket {
        AnalysisTicket {
            project: self.project,
            key: key.into(),
        }
    }

    /// Starts (or joins) the cached analysis of `source`. The returned future
    /// owns everything it needs, so it can be spawned while the session keeps
    /// handling ticks.
    pub fn request_analysis(&self, source: Arc<dyn AudioSource>) -> (AnalysisTicket, AnalysisRequest) {
        let key = source.key();
        let ticket = self.begin_analysis(key.clone());
        let cache = self.cache.clone();
        let config = self.config.analysis.clone();

        let request = async move {
            cache
                .get_or_compute(&key, move || analyze_source(source, config))
                .await
        }
        .boxed();

        (ticket, request)
    }

    /// Installs the outcome of an analysis. Returns `false` when the ticket
    /// belongs to a project that is no longer open.
    ///
    /// Failures never abort the session: the beat list becomes empty and
    /// [`EditingSession::error_message`] explains what happened.
    pub fn apply_analysis(
        &mut self,
        ticket: &AnalysisTicket,
        outcome: Result<Arc<AnalysisResult>>,
    ) -> bool {
        if ticket.project != self.project {
            warn!(
                key = %ticket.key,
                ticket = %ticket.project,
                current = %self.project,
                "discarding analysis for a project that is no longer open"
            );
            return false;
        }

        match outcome {
            Ok(analysis) => {
                info!(key = %ticket.key, beats = analysis.beats().len(), "beats loaded");
                self.error_message = None;
                self.install(analysis);
            }
            Err(err) => {
                warn!(
                    key = %ticket.key,
                    error = %err,
                    degraded = err.degrades_to_empty(),
                    "analysis failed, continuing without beats"
                );
                self.error_message = Some(err.user_message());
                self.install(Arc::new(AnalysisResult::empty()));
            }
        }
        true
    }

    /// Analyses `source` through the cache and applies the result.
    pub async fn load_audio(&mut self, source: Arc<dyn AudioSource>) -> bool {
        let (ticket, request) = self.request_analysis(source);
        let outcome = request.await;
        self.apply_analysis(&ticket, outcome)
    }

    fn install(&mut self, analysis: Arc<AnalysisResult>) {
        self.analysis = analysis;
        self.synchronizer.set_analysis(Arc::clone(&self.analysis));
        self.driver.reset();
        self.modulator.reset();
    }

    pub fn beats(&self) -> &[Beat] {
        self.analysis.beats()
    }

    pub fn analysis(&self) -> &Arc<AnalysisResult> {
        &self.analysis
    }

    /// User-facing explanation of the last analysis failure.
    pub fn error_message(&self) -> Option<&'static str> {
        self.error_message
    }

    /// Length reported by the media element, when it differs from the
    /// decoder's.
    pub fn set_media_duration(&mut self, duration: f64) {
        self.media_duration = (duration.is_finite() && duration >= 0.0).then_some(duration);
    }

    pub fn duration(&self) -> f64 {
        self.media_duration.unwrap_or_else(|| self.analysis.duration())
    }

    pub fn active_beat(&self) -> Option<Beat> {
        self.synchronizer.state().active_beat
    }

    pub fn pulse_state(&self) -> &PulseState {
        self.synchronizer.state()
    }

    /// Receiver of the general pulse, which reverts to neutral on its own.
    pub fn subscribe_pulse(&self) -> watch::Receiver<PulseParams> {
        self.driver.subscribe()
    }

    pub fn visualizer(&self) -> &VisualModulator {
        &self.modulator
    }

    /// Swaps the visualizer settings. On error the previous settings stay in
    /// effect.
    pub fn set_visualizer_config(&mut self, visualizer: VisualizerConfig) -> Result<()> {
        let modulator = VisualModulator::new(&visualizer, &self.config.sync, &self.assets)?;
        self.modulator = modulator;
        self.synchronizer.set_sync_intensity(visualizer.sync_intensity);
        self.synchronizer.set_enabled(visualizer.beat_sync_enabled);
        if !visualizer.beat_sync_enabled {
            self.driver.reset();
        }
        self.config.visualizer = visualizer;
        Ok(())
    }

    /// Feeds one playback position and returns the parameters for the frame
    /// drawn at `now`. Must run inside a tokio runtime.
    pub fn tick(&mut self, current_time: f64, now: Instant) -> FrameParameters {
        if let Some(event) = self.synchronizer.observe(current_time, now) {
            self.driver.fire(event.params);
            self.modulator.on_pulse(&event, now);
        }
        let pulse = self.synchronizer.state().params_at(now);
        self.modulator.frame(current_time, self.duration(), pulse, now)
    }

    /// [`EditingSession::tick`] followed by a draw into `sink`.
    pub fn render(
        &mut self,
        sink: &mut dyn RenderSink,
        current_time: f64,
        now: Instant,
    ) -> Result<FrameParameters> {
        let frame = self.tick(current_time, now);
        let active = self.active_beat();
        let overlay = TimelineOverlay::build(
            self.analysis.beats(),
            &self.annotations,
            current_time,
            self.duration(),
            active.as_ref(),
            self.synchronizer.is_enabled(),
        );
        sink.draw(&frame, &overlay)?;
        Ok(frame)
    }

    pub fn annotations(&self) -> &AnnotationStore {
        &self.annotations
    }

    pub fn annotate(&mut self, timestamp: f64, selection: Option<TimelineCommand>) {
        self.annotations.apply(timestamp, selection);
    }
}

impl fmt::Debug for EditingSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EditingSession")
            .field("project", &self.project)
            .field("beats", &self.analysis.beats().len())
            .field("annotations", &self.annotations.len())
            .field("style", &self.modulator.style())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{mpsc, Mutex},
        time::Duration,
    };

    use super::*;
    use crate::{BeatSyncError, DecodedAudio, FrameLog, VariantFrame, VisualizerStyle};

    /// Blocks in `fetch_and_decode` until the test releases it.
    struct GatedSource {
        gate: Mutex<mpsc::Receiver<()>>,
    }

    impl AudioSource for GatedSource {
        fn key(&self) -> String {
            "gated.wav".into()
        }

        fn fetch_and_decode(&self) -> Result<DecodedAudio> {
            let gate = self
                .gate
                .lock()
                .map_err(|_| BeatSyncError::msg("gate poisoned"))?;
            gate.recv()
                .map_err(|_| BeatSyncError::SourceUnavailable("gate dropped".into()))?;
            Ok(DecodedAudio {
                sample_rate: 8_000,
                channels: vec![Vec::new()],
                duration: 3.0,
            })
        }
    }

    struct BrokenSource;

    impl AudioSource for BrokenSource {
        fn key(&self) -> String {
            "broken.wav".into()
        }

        fn fetch_and_decode(&self) -> Result<DecodedAudio> {
            Err(BeatSyncError::Decode("unexpected end of stream".into()))
        }
    }

    fn session() -> EditingSession {
        EditingSession::new(AppConfig::default(), AnalysisCache::new()).unwrap()
    }

    fn analysis(timestamps: &[f64]) -> Arc<AnalysisResult> {
        let beats = timestamps
            .iter()
            .map(|&timestamp| Beat {
                timestamp,
                intensity: 0.8,
                bass_intensity: 0.6,
            })
            .collect();
        Arc::new(AnalysisResult::new(beats, 4.0).unwrap())
    }

    #[tokio::test]
    async fn stale_results_are_discarded() {
        let mut session = session();
        let ticket = session.begin_analysis("song-a");
        session.switch_project();

        assert!(!session.apply_analysis(&ticket, Ok(analysis(&[1.0]))));
        assert!(session.beats().is_empty());

        let ticket = session.begin_analysis("song-b");
        assert!(session.apply_analysis(&ticket, Ok(analysis(&[1.0, 2.0]))));
        assert_eq!(session.beats().len(), 2);
    }

    #[tokio::test]
    async fn failed_analysis_degrades_to_no_beats() {
        let mut session = session();
        let ticket = session.begin_analysis("song");
        session.apply_analysis(&ticket, Ok(analysis(&[1.0])));

        assert!(session.load_audio(Arc::new(BrokenSource)).await);
        assert!(session.beats().is_empty());
        assert!(session.error_message().unwrap().contains("corrupt"));
    }

    #[tokio::test]
    async fn switching_project_clears_annotations_and_pulse() {
        let mut session = session();
        let ticket = session.begin_analysis("song");
        session.apply_analysis(&ticket, Ok(analysis(&[1.0])));
        session.annotate(1.0, Some(TimelineCommand::Explosion));
        session.tick(1.0, Instant::now());
        assert!(!session.subscribe_pulse().borrow().is_neutral());

        let previous = session.project();
        assert_ne!(session.switch_project(), previous);
        assert!(session.annotations().is_empty());
        assert!(session.active_beat().is_none());
        assert!(session.subscribe_pulse().borrow().is_neutral());
    }

    #[tokio::test(start_paused = true)]
    async fn tick_fires_driver_and_modulator_once_per_beat() {
        let mut session = session();
        let ticket = session.begin_analysis("song");
        session.apply_analysis(&ticket, Ok(analysis(&[1.0])));
        let mut pulses = session.subscribe_pulse();

        let start = Instant::now();
        let frame = session.tick(0.98, start);
        assert!(pulses.has_changed().unwrap());
        assert!(!pulses.borrow_and_update().is_neutral());
        assert!(matches!(
            frame.variant,
            VariantFrame::Waveform { scale_y, .. } if scale_y > 1.0
        ));

        session.tick(1.02, start + Duration::from_millis(40));
        assert!(!pulses.has_changed().unwrap());

        tokio::time::sleep(Duration::from_millis(401)).await;
        assert!(pulses.borrow_and_update().is_neutral());
    }

    #[tokio::test]
    async fn render_draws_overlay_with_annotations() {
        let mut session = session();
        let ticket = session.begin_analysis("song");
        session.apply_analysis(&ticket, Ok(analysis(&[1.0, 2.0])));
        session.annotate(2.0, Some(TimelineCommand::ZoomIn));

        let mut log = FrameLog::new();
        session.render(&mut log, 1.0, Instant::now()).unwrap();

        let (_, overlay) = log.last().unwrap();
        assert_eq!(overlay.playhead, 0.25);
        assert!(overlay.markers[0].active);
        assert_eq!(overlay.markers[1].command, Some(TimelineCommand::ZoomIn));
    }

    #[tokio::test]
    async fn invalid_visualizer_settings_keep_the_old_ones() {
        let mut session = session();
        let bad = VisualizerConfig {
            sync_intensity: 250.0,
            ..Default::default()
        };
        assert!(session.set_visualizer_config(bad).is_err());
        assert_eq!(session.visualizer().style(), VisualizerStyle::Waveform);

        let bars = VisualizerConfig {
            style: VisualizerStyle::Bars,
            ..Default::default()
        };
        session.set_visualizer_config(bars).unwrap();
        assert_eq!(session.visualizer().style(), VisualizerStyle::Bars);
    }

    #[tokio::test]
    async fn switching_project_mid_analysis_discards_the_result() {
        let mut session = session();
        let (release, gate) = mpsc::channel();
        let source = Arc::new(GatedSource {
            gate: Mutex::new(gate),
        });

        let (ticket, request) = session.request_analysis(source);
        let pending = tokio::spawn(request);

        session.switch_project();
        release.send(()).unwrap();
        let outcome = pending.await.unwrap();

        assert_eq!(outcome.as_ref().unwrap().duration(), 3.0);
        assert!(!session.apply_analysis(&ticket, outcome));
        assert_eq!(session.duration(), 0.0);
        assert!(session.error_message().is_none());
    }

    #[tokio::test]
    async fn disabling_sync_neutralises_the_frame_pulse() {
        let mut session = session();
        let ticket = session.begin_analysis("song");
        session.apply_analysis(&ticket, Ok(analysis(&[1.0])));

        let now = Instant::now();
        assert!(!session.tick(1.0, now).pulse.is_neutral());

        let disabled = VisualizerConfig {
            beat_sync_enabled: false,
            ..Default::default()
        };
        session.set_visualizer_config(disabled).unwrap();

        assert!(session.tick(1.0, now).pulse.is_neutral());
        assert!(session.subscribe_pulse().borrow().is_neutral());
    }
}
