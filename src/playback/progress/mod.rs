pub mod handle;

use crate::playback::controller::PlaybackStatus;
pub use handle::ProgressHandle;

/// Events published by the playback controller
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackProgress {
    StateChanged {
        status: PlaybackStatus,
        story_id: Option<String>,
    },
    PositionUpdate {
        story_id: String,
        position_ms: f64,
    },
    /// The audible item changed; `None` means a gap
    ClipTransition {
        story_id: String,
        from: Option<String>,
        to: Option<String>,
    },
    Seeked {
        position_ms: f64,
    },
    Looped {
        story_id: String,
    },
    Finished {
        story_id: String,
    },
}

pub type PlaybackProgressHandle = ProgressHandle<PlaybackProgress>;
