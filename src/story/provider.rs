use crate::api::models::{
    Story, StoryCreate, StoryItem, StoryItemBatchUpdate, StoryItemCreate, StoryItemMove,
    StorySummary,
};
use crate::api::ApiError;

/// Backend operations the story core depends on (allows mocking for tests)
///
/// `reorder_items` returns the authoritative order and timing after the reorder.
#[async_trait::async_trait]
pub trait StoryDataProvider: Send + Sync {
    async fn list_stories(&self) -> Result<Vec<StorySummary>, ApiError>;
    async fn get_story(&self, story_id: &str) -> Result<Story, ApiError>;
    async fn create_story(&self, data: &StoryCreate) -> Result<StorySummary, ApiError>;
    async fn update_story(&self, story_id: &str, data: &StoryCreate)
        -> Result<StorySummary, ApiError>;
    async fn delete_story(&self, story_id: &str) -> Result<(), ApiError>;
    async fn add_item(&self, story_id: &str, data: &StoryItemCreate)
        -> Result<StoryItem, ApiError>;
    async fn remove_item(&self, story_id: &str, generation_id: &str) -> Result<(), ApiError>;
    async fn update_item_times(
        &self,
        story_id: &str,
        data: &StoryItemBatchUpdate,
    ) -> Result<(), ApiError>;
    async fn reorder_items(
        &self,
        story_id: &str,
        generation_ids: &[String],
    ) -> Result<Vec<StoryItem>, ApiError>;
    async fn move_item(
        &self,
        story_id: &str,
        generation_id: &str,
        data: &StoryItemMove,
    ) -> Result<StoryItem, ApiError>;
    async fn export_audio(&self, story_id: &str) -> Result<Vec<u8>, ApiError>;
    /// Raw audio file bytes for one generation
    async fn clip_audio(&self, generation_id: &str) -> Result<Vec<u8>, ApiError>;
}
