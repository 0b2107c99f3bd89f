// Library exports for the binary and integration tests

pub mod api;
pub mod config;
pub mod export;
pub mod playback;
pub mod story;

pub use api::{ApiError, Story, StoryClient, StoryItem, StorySummary};
pub use config::Config;
pub use playback::{PlaybackController, PlaybackSession, PlaybackStatus, StoryPlaybackService};
pub use story::{StoryDataProvider, Timeline};

// Test support (unit tests, or integration tests with the test-utils feature)
#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;
