//! Core library of the beat sync engine.
//!
//! Audio is decoded and analysed once per resource into a beat sequence,
//! which is then cached for the session. Playback positions fed to the
//! synchronizer turn into edge-triggered pulses that drive the visualizer
//! variants and the timeline overlay. Each module owns one of these stages;
//! [`EditingSession`] wires them together for one open project.

pub mod analysis;
pub mod assets;
pub mod audio;
pub mod cache;
pub mod config;
pub mod error;
pub mod mapping;
pub mod render;
pub mod scene;
pub mod session;
pub mod timeline;

pub use analysis::{
    AnalysisResult, Beat, BeatDetector, FeatureExtractor, FrameFeatures, OnsetDetector,
};
pub use assets::{AnimationTemplate, AssetStore, TemplatePatch};
pub use audio::{analyze_source, AudioSource, DecodedAudio, PcmSource, WavFileSource};
pub use cache::AnalysisCache;
pub use config::{AnalysisConfig, AppConfig, SyncConfig, VisualizerConfig};
pub use error::{BeatSyncError, Result};
pub use mapping::{FrameParameters, VariantFrame, VisualModulator};
pub use render::{time_from_pointer, BeatMarker, FrameLog, RenderSink, TimelineOverlay};
pub use scene::{VisualizerColor, VisualizerStyle};
pub use session::{AnalysisRequest, AnalysisTicket, EditingSession, ProjectId};
pub use timeline::{
    AnnotationStore, PlaybackClock, PlaybackSynchronizer, PulseDriver, PulseEvent, PulseParams,
    PulseState, PulseWindow, TimelineCommand,
};
