//! Event types for ProMix

use crate::handle::TrackHandle;

/// Capacity of the render-to-control event queue. Events beyond this are dropped.
pub const EVENT_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProMixEvent {
    /// A non-looping track reached its end and its slot is free again
    TrackFinished { handle: TrackHandle },
    /// The render callback found the track lock busy and output silence
    RenderSkipped { frames: usize },
}

impl ProMixEvent {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::RenderSkipped { .. })
    }
}
