pub mod clock;
pub mod controller;
pub mod cpal_output;
pub mod output;
pub mod progress;
pub mod service;
pub mod symphonia_decoder;

pub use clock::{Anchor, ClockReading, PlaybackClock};
pub use controller::{PlaybackController, PlaybackSession, PlaybackStatus};
pub use cpal_output::{list_output_devices, AudioError, CpalAudioOutput, OutputDevice};
pub use output::{AudioOutput, DecodedClip};
pub use progress::{PlaybackProgress, PlaybackProgressHandle};
pub use service::{StoryCommand, StoryPlaybackHandle, StoryPlaybackService, StoryProgress};
