use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::{sync::watch, task::JoinHandle, time::Instant};
use tracing::trace;

use crate::Beat;

/// Parameters derived from a beat at its rising edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PulseParams {
    /// Scale of the video frame.
    pub scale: f32,
    /// Opacity of the glow around the video frame.
    pub shadow_opacity: f32,
    /// Playback speed multiplier for burst animations.
    pub burst_speed: f32,
    /// Transient scale of burst animations, driven by bass.
    pub burst_scale: f32,
}

impl PulseParams {
    pub const NEUTRAL: PulseParams = PulseParams {
        scale: 1.0,
        shadow_opacity: 0.0,
        burst_speed: 1.0,
        burst_scale: 1.0,
    };

    /// `sync_intensity` is the 0-100 user control. Burst parameters treat 50
    /// as the 1x baseline.
    pub fn from_beat(beat: &Beat, sync_intensity: f32) -> Self {
        let strength = sync_intensity / 100.0;
        let factor = sync_intensity / 50.0;
        Self {
            scale: 1.0 + strength * 0.05 * beat.intensity,
            shadow_opacity: strength * 0.7 * beat.intensity,
            burst_speed: (1.0 + beat.intensity * 1.5 * factor).max(0.1),
            burst_scale: 1.0 + beat.bass_intensity * 0.4 * factor,
        }
    }

    pub fn is_neutral(&self) -> bool {
        *self == Self::NEUTRAL
    }
}

impl Default for PulseParams {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

/// A value that holds for a fixed time after it was set and then reads as
/// its baseline.
#[derive(Debug, Clone, PartialEq)]
pub struct PulseWindow<T> {
    baseline: T,
    duration: Duration,
    active: Option<(T, Instant)>,
}

impl<T: Clone> PulseWindow<T> {
    pub fn new(baseline: T, duration: Duration) -> Self {
        Self {
            baseline,
            duration,
            active: None,
        }
    }

    /// Starts a new window, replacing any running one.
    pub fn trigger(&mut self, value: T, now: Instant) -> Instant {
        let expires_at = now + self.duration;
        self.active = Some((value, expires_at));
        expires_at
    }

    pub fn value_at(&self, now: Instant) -> T {
        match &self.active {
            Some((value, expires_at)) if now < *expires_at => value.clone(),
            _ => self.baseline.clone(),
        }
    }

    pub fn is_active(&self, now: Instant) -> bool {
        self.active
            .as_ref()
            .is_some_and(|(_, expires_at)| now < *expires_at)
    }

    pub fn expires_at(&self) -> Option<Instant> {
        self.active.as_ref().map(|(_, expires_at)| *expires_at)
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn reset(&mut self) {
        self.active = None;
    }
}

/// Pushes pulse values to subscribers and reverts them to the baseline from
/// a timer task, without waiting for another time sample.
///
/// A newer pulse cancels the revert timer of the previous one.
#[derive(Debug)]
pub struct PulseDriver<T> {
    baseline: T,
    duration: Duration,
    sender: watch::Sender<T>,
    timer: Option<JoinHandle<()>>,
}

impl<T> PulseDriver<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(baseline: T, duration: Duration) -> Self {
        let (sender, _) = watch::channel(baseline.clone());
        Self {
            baseline,
            duration,
            sender,
            timer: None,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.sender.subscribe()
    }

    pub fn current(&self) -> T {
        self.sender.borrow().clone()
    }

    /// Publishes `value` and schedules the revert. Must be called from
    /// within a tokio runtime.
    pub fn fire(&mut self, value: T) {
        self.cancel_timer();
        self.sender.send_replace(value);

        let sender = self.sender.clone();
        let baseline = self.baseline.clone();
        let duration = self.duration;
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            trace!(?duration, "pulse window expired");
            sender.send_replace(baseline);
        }));
    }

    /// Drops any running pulse immediately.
    pub fn reset(&mut self) {
        self.cancel_timer();
        self.sender.send_replace(self.baseline.clone());
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl<T> Drop for PulseDriver<T> {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn beat(intensity: f32, bass_intensity: f32) -> Beat {
        Beat {
            timestamp: 1.0,
            intensity,
            bass_intensity,
        }
    }

    #[test]
    fn derives_parameters_from_sync_intensity() {
        let params = PulseParams::from_beat(&beat(0.8, 0.5), 100.0);
        assert!((params.scale - 1.04).abs() < 1e-6);
        assert!((params.shadow_opacity - 0.56).abs() < 1e-6);
        // factor 2: 1 + 0.8 * 1.5 * 2
        assert!((params.burst_speed - 3.4).abs() < 1e-5);
        assert!((params.burst_scale - 1.4).abs() < 1e-6);
    }

    #[test]
    fn zero_intensity_is_neutral() {
        assert!(PulseParams::from_beat(&beat(1.0, 1.0), 0.0).is_neutral());
    }

    #[test]
    fn burst_speed_never_drops_below_floor() {
        let params = PulseParams::from_beat(&beat(-2.0, 0.0), 100.0);
        assert_eq!(params.burst_speed, 0.1);
    }

    #[test]
    fn window_reads_baseline_after_expiry() {
        let start = Instant::now();
        let mut window = PulseWindow::new(1.0_f32, Duration::from_millis(150));
        window.trigger(1.3, start);

        assert_eq!(window.value_at(start + Duration::from_millis(149)), 1.3);
        assert_eq!(window.value_at(start + Duration::from_millis(150)), 1.0);
        assert!(!window.is_active(start + Duration::from_secs(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn driver_reverts_on_its_own() {
        let mut driver = PulseDriver::new(PulseParams::NEUTRAL, Duration::from_millis(400));
        let mut rx = driver.subscribe();
        let pulse = PulseParams::from_beat(&beat(1.0, 1.0), 50.0);

        driver.fire(pulse);
        assert_eq!(*rx.borrow_and_update(), pulse);

        tokio::time::sleep(Duration::from_millis(399)).await;
        assert_eq!(driver.current(), pulse);

        rx.changed().await.unwrap();
        assert!(rx.borrow().is_neutral());
    }

    #[tokio::test(start_paused = true)]
    async fn newer_pulse_cancels_older_revert() {
        let mut driver = PulseDriver::new(1.0_f32, Duration::from_millis(300));

        driver.fire(1.2);
        tokio::time::sleep(Duration::from_millis(200)).await;
        driver.fire(1.4);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(driver.current(), 1.4);

        tokio::time::sleep(Duration::from_millis(101)).await;
        assert_eq!(driver.current(), 1.0);
    }
}
