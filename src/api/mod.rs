pub mod client;
pub mod models;

pub use client::{ApiError, StoryClient};
pub use models::{Story, StoryItem, StorySummary};
