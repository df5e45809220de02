use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use beatsync_core::{
    AnalysisCache, AnalysisResult, AppConfig, BeatSyncError, EditingSession, FrameLog,
    PlaybackClock, VariantFrame, VisualizerColor, VisualizerStyle, WavFileSource,
};
use clap::{Parser, Subcommand};
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> beatsync_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };

    match cli.command {
        Commands::Analyze { input, output } => run_analyze(config, input, output.as_deref()).await,
        Commands::Preview {
            input,
            style,
            color,
            sync_intensity,
            fps,
        } => {
            let mut config = config;
            if let Some(style) = style {
                config.visualizer.style = style;
            }
            if let Some(color) = color {
                config.visualizer.color = color;
            }
            if let Some(sync_intensity) = sync_intensity {
                config.visualizer.sync_intensity = sync_intensity;
            }
            run_preview(config, input, fps).await
        }
    }
}

async fn run_analyze(
    config: AppConfig,
    input: PathBuf,
    output: Option<&Path>,
) -> beatsync_core::Result<()> {
    tracing::info!(?input, ?output, "analysing audio file");

    let source = Arc::new(WavFileSource::new(input));
    let result = beatsync_core::analyze_source(source, config.analysis).await?;
    write_analysis(&result, output)
}

/// Prints `result` as JSON, or writes it to `output`.
fn write_analysis(result: &AnalysisResult, output: Option<&Path>) -> beatsync_core::Result<()> {
    let json = serde_json::to_string_pretty(result)
        .map_err(|err| BeatSyncError::msg(format!("failed to serialise analysis: {err}")))?;

    match output {
        Some(path) => std::fs::write(path, json).map_err(|err| {
            BeatSyncError::msg(format!("failed to write `{}`: {err}", path.display()))
        })?,
        None => println!("{json}"),
    }
    Ok(())
}

async fn run_preview(config: AppConfig, input: PathBuf, fps: u32) -> beatsync_core::Result<()> {
    if fps == 0 {
        return Err(BeatSyncError::invalid("fps must be positive"));
    }
    tracing::info!(
        ?input,
        style = %config.visualizer.style,
        color = %config.visualizer.color,
        fps,
        "starting preview"
    );

    let mut session = EditingSession::new(config, AnalysisCache::new())?;
    session.load_audio(Arc::new(WavFileSource::new(input))).await;
    if let Some(message) = session.error_message() {
        tracing::warn!(reason = message, "previewing without beats");
    }

    let step = 1.0 / fps as f64;
    let mut clock = PlaybackClock::new(session.duration());
    let mut sink = FrameLog::new();
    let start = Instant::now();
    let mut last_pulsed = None;

    loop {
        let now = start + Duration::from_secs_f64(clock.time_seconds);
        let frame = session.render(&mut sink, clock.time_seconds, now)?;

        let pulsed = session.pulse_state().last_pulsed_timestamp;
        if pulsed.is_some() && pulsed != last_pulsed {
            tracing::info!(
                time = clock.time_seconds,
                beat = ?pulsed,
                scale = frame.pulse.scale,
                "beat pulse"
            );
        }
        last_pulsed = pulsed;

        match frame.variant {
            VariantFrame::Waveform {
                scrub_frame,
                scale_y,
            } => tracing::debug!(time = clock.time_seconds, scrub_frame, scale_y, "frame"),
            VariantFrame::Burst {
                restart,
                frame,
                speed,
                scale,
            } => tracing::debug!(time = clock.time_seconds, restart, frame, speed, scale, "frame"),
        }

        if clock.is_finished() {
            break;
        }
        clock.advance(step);
    }

    tracing::info!(
        frames = sink.frames().len(),
        beats = session.beats().len(),
        "preview finished"
    );
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Audio-reactive beat sync engine", long_about = None)]
struct Cli {
    /// JSON configuration file; missing fields take their defaults.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Detect beats in a WAV file and print them as JSON.
    Analyze {
        /// Path to the audio file that should be analysed.
        input: PathBuf,
        /// Write the result here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Simulate playback of a WAV file and log beat pulses.
    Preview {
        input: PathBuf,
        /// Waveform, Bars or Particles.
        #[arg(long)]
        style: Option<VisualizerStyle>,
        /// Amber, Aqua or Crimson.
        #[arg(long)]
        color: Option<VisualizerColor>,
        /// 0-100.
        #[arg(long)]
        sync_intensity: Option<f32>,
        /// Playhead samples per second.
        #[arg(long, default_value_t = 30)]
        fps: u32,
    },
}
