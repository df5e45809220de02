/// Simulated playhead for driving the synchronizer without a media element.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PlaybackClock {
    pub time_seconds: f64,
    pub duration: f64,
}

impl PlaybackClock {
    pub fn new(duration: f64) -> Self {
        Self {
            time_seconds: 0.0,
            duration: duration.max(0.0),
        }
    }

    pub fn reset(&mut self) {
        self.time_seconds = 0.0;
    }

    /// Moves forward by `delta` seconds, stopping at the end.
    pub fn advance(&mut self, delta: f64) {
        self.time_seconds = (self.time_seconds + delta).clamp(0.0, self.duration);
    }

    pub fn seek(&mut self, time_seconds: f64) {
        self.time_seconds = time_seconds.clamp(0.0, self.duration);
    }

    pub fn is_finished(&self) -> bool {
        self.time_seconds >= self.duration
    }

    /// Playhead position as a fraction of the duration.
    pub fn progress(&self) -> f64 {
        if self.duration > 0.0 {
            self.time_seconds / self.duration
        } else {
            0.0
        }
    }
}
