//! Everything keyed by playback time: the synchronizer that turns playhead
//! samples into beat pulses, the pulse timers, and the per-beat annotations.

mod annotations;
mod clock;
mod pulse;
mod sync;

pub use annotations::{AnnotationStore, TimelineCommand};
pub use clock::PlaybackClock;
pub use pulse::{PulseDriver, PulseParams, PulseWindow};
pub use sync::{PlaybackSynchronizer, PulseEvent, PulseState};
