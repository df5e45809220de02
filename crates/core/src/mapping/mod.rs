//! Maps beat pulses and the playhead onto per-frame animation parameters for
//! the active visualizer variant.

use std::sync::Arc;

use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

use crate::{
    AnimationTemplate, AssetStore, Beat, PulseEvent, PulseParams, PulseWindow, Result, SyncConfig,
    VisualizerConfig, VisualizerStyle,
};

/// Variant specific part of [`FrameParameters`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum VariantFrame {
    /// Follows the playhead; `scale_y` briefly rises on beats.
    Waveform { scrub_frame: f64, scale_y: f32 },
    /// Bars or Particles: a burst replayed from frame 0 on every beat.
    Burst {
        /// Set on the first frame after a rising edge.
        restart: bool,
        /// Position inside the burst animation.
        frame: f64,
        speed: f32,
        scale: f32,
    },
}

/// Everything the renderer needs for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FrameParameters {
    pub style: VisualizerStyle,
    /// Cross-component pulse applied to the video frame.
    pub pulse: PulseParams,
    pub variant: VariantFrame,
}

#[derive(Debug, Clone, Copy)]
struct Burst {
    started_at: Instant,
    speed: f32,
    restart_pending: bool,
}

/// Derived animation plus the transient pulses of one visualizer variant.
#[derive(Debug, Clone)]
pub struct VisualModulator {
    config: VisualizerConfig,
    animation: Arc<AnimationTemplate>,
    waveform_pulse: PulseWindow<f32>,
    burst_scale: PulseWindow<f32>,
    burst: Option<Burst>,
}

impl VisualModulator {
    /// Validates `config` and derives the recoloured animation for its
    /// style. Shared templates in `assets` are left untouched.
    pub fn new(config: &VisualizerConfig, sync: &SyncConfig, assets: &AssetStore) -> Result<Self> {
        config.validate()?;
        sync.validate()?;
        let animation = Arc::new(derive_animation(config, assets)?);

        Ok(Self {
            config: config.clone(),
            animation,
            waveform_pulse: PulseWindow::new(1.0, sync.waveform_pulse()),
            burst_scale: PulseWindow::new(1.0, sync.burst_pulse()),
            burst: None,
        })
    }

    pub fn style(&self) -> VisualizerStyle {
        self.config.style
    }

    pub fn config(&self) -> &VisualizerConfig {
        &self.config
    }

    /// Animation the renderer should load for the current configuration.
    pub fn animation(&self) -> &Arc<AnimationTemplate> {
        &self.animation
    }

    /// Playhead position mapped onto the waveform animation. Depends only on
    /// the ratio of the two arguments.
    pub fn scrub_frame(&self, current_time: f64, duration: f64) -> f64 {
        if !(duration > 0.0) || !current_time.is_finite() {
            return 0.0;
        }
        (current_time / duration).clamp(0.0, 1.0) * self.animation.total_frames()
    }

    /// Scale the waveform jumps to on `beat`.
    pub fn waveform_pulse_for(&self, beat: &Beat) -> f32 {
        1.0 + beat.intensity * 0.15 * (self.config.waveform_sensitivity / 50.0)
    }

    /// Reacts to a rising edge reported by the synchronizer.
    pub fn on_pulse(&mut self, event: &PulseEvent, now: Instant) {
        match self.config.style {
            VisualizerStyle::Waveform => {
                let scale = self.waveform_pulse_for(&event.beat);
                self.waveform_pulse.trigger(scale, now);
            }
            VisualizerStyle::Bars | VisualizerStyle::Particles => {
                self.burst_scale.trigger(event.params.burst_scale, now);
                self.burst = Some(Burst {
                    started_at: now,
                    speed: event.params.burst_speed,
                    restart_pending: true,
                });
            }
        }
        debug!(
            style = %self.config.style,
            timestamp = event.beat.timestamp,
            "visualizer pulse"
        );
    }

    /// Parameters for the frame drawn at `now`. `pulse` is the general pulse
    /// currently in effect and is passed through unchanged.
    pub fn frame(
        &mut self,
        current_time: f64,
        duration: f64,
        pulse: PulseParams,
        now: Instant,
    ) -> FrameParameters {
        let variant = match self.config.style {
            VisualizerStyle::Waveform => VariantFrame::Waveform {
                scrub_frame: self.scrub_frame(current_time, duration),
                scale_y: self.waveform_pulse.value_at(now),
            },
            VisualizerStyle::Bars | VisualizerStyle::Particles => self.burst_frame(now),
        };

        FrameParameters {
            style: self.config.style,
            pulse,
            variant,
        }
    }

    fn burst_frame(&mut self, now: Instant) -> VariantFrame {
        let scale = self.burst_scale.value_at(now);
        match self.burst.as_mut() {
            Some(burst) => {
                let restart = std::mem::take(&mut burst.restart_pending);
                let elapsed = now.saturating_duration_since(burst.started_at).as_secs_f64();
                let frame = (elapsed * self.animation.frame_rate() * burst.speed as f64)
                    .min(self.animation.total_frames());
                VariantFrame::Burst {
                    restart,
                    frame,
                    speed: burst.speed,
                    scale,
                }
            }
            // Nothing has fired yet: the burst rests at its end frame.
            None => VariantFrame::Burst {
                restart: false,
                frame: self.animation.total_frames(),
                speed: 1.0,
                scale,
            },
        }
    }

    /// Drops any running pulses, e.g. after a project switch.
    pub fn reset(&mut self) {
        self.waveform_pulse.reset();
        self.burst_scale.reset();
        self.burst = None;
    }
}

fn derive_animation(config: &VisualizerConfig, assets: &AssetStore) -> Result<AnimationTemplate> {
    let template = assets.template(config.style)?;
    let rgba = config.color.rgba();
    let patch = match config.style {
        VisualizerStyle::Waveform => template
            .patch()
            .fill_to_stroke(config.waveform_thickness as f64, rgba)?,
        VisualizerStyle::Bars | VisualizerStyle::Particles => template.patch().recolor(rgba),
    };
    Ok(patch.build())
}
