// Test support utilities for both unit and integration tests

use crate::api::models::{
    Story, StoryCreate, StoryItem, StoryItemBatchUpdate, StoryItemCreate, StoryItemMove,
    StorySummary,
};
use crate::api::ApiError;
use crate::playback::clock::ClockReading;
use crate::playback::output::{AudioOutput, DecodedClip};
use crate::story::provider::StoryDataProvider;
use crate::story::reorder::provisional_layout;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Calls recorded by `ManualAudioOutput`
#[derive(Debug, Clone, PartialEq)]
pub enum OutputCall {
    Load { generation_id: String },
    Play { generation_id: String, offset_ms: f64 },
    Stop,
}

#[derive(Debug)]
struct ManualOutputState {
    clock: Option<ClockReading>,
    calls: Vec<OutputCall>,
    clips: HashSet<String>,
}

/// Audio output whose hardware clock is moved by hand
///
/// Clones share state, so a test can keep one clone while the controller owns another.
#[derive(Debug, Clone)]
pub struct ManualAudioOutput {
    state: Arc<Mutex<ManualOutputState>>,
}

impl Default for ManualAudioOutput {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(ManualOutputState {
                clock: Some(ClockReading::new(0, 0.0)),
                calls: Vec::new(),
                clips: HashSet::new(),
            })),
        }
    }
}

impl ManualAudioOutput {
    /// Output with a running clock at 0s
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_clock(&self, seconds: f64) {
        let mut state = self.state.lock().unwrap();
        let epoch = state.clock.map(|c| c.epoch).unwrap_or(0);
        state.clock = Some(ClockReading::new(epoch, seconds));
    }

    pub fn advance(&self, seconds: f64) {
        let mut state = self.state.lock().unwrap();
        if let Some(clock) = state.clock.as_mut() {
            clock.seconds += seconds;
        }
    }

    /// Report no clock, as an output that has not started yet
    pub fn halt_clock(&self) {
        self.state.lock().unwrap().clock = None;
    }

    /// Simulate a new output stream: fresh epoch, clock back at 0s
    pub fn restart_clock(&self) {
        let mut state = self.state.lock().unwrap();
        let epoch = state.clock.map(|c| c.epoch + 1).unwrap_or(1);
        state.clock = Some(ClockReading::new(epoch, 0.0));
    }

    pub fn calls(&self) -> Vec<OutputCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn last_play(&self) -> Option<OutputCall> {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .rev()
            .find(|call| matches!(call, OutputCall::Play { .. }))
            .cloned()
    }

    pub fn play_count(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|call| matches!(call, OutputCall::Play { .. }))
            .count()
    }

    pub fn loaded_clips(&self) -> Vec<String> {
        let mut clips: Vec<String> = self.state.lock().unwrap().clips.iter().cloned().collect();
        clips.sort();
        clips
    }
}

impl AudioOutput for ManualAudioOutput {
    fn clock(&self) -> Option<ClockReading> {
        self.state.lock().unwrap().clock
    }

    fn has_clip(&self, generation_id: &str) -> bool {
        self.state.lock().unwrap().clips.contains(generation_id)
    }

    fn load_clip(&mut self, generation_id: &str, _clip: DecodedClip) {
        let mut state = self.state.lock().unwrap();
        state.clips.insert(generation_id.to_string());
        state.calls.push(OutputCall::Load {
            generation_id: generation_id.to_string(),
        });
    }

    fn play_clip(&mut self, generation_id: &str, offset_ms: f64) {
        self.state.lock().unwrap().calls.push(OutputCall::Play {
            generation_id: generation_id.to_string(),
            offset_ms,
        });
    }

    fn stop(&mut self) {
        self.state.lock().unwrap().calls.push(OutputCall::Stop);
    }
}

/// In-memory story backend
///
/// Reorders are applied when the request arrives; the response can then be held back
/// with `push_reorder_delay` to simulate a slow network. `push_story_delay` does the
/// same for story fetches.
#[derive(Default)]
pub struct MockStoryProvider {
    stories: Mutex<HashMap<String, Story>>,
    clip_audio: Mutex<HashMap<String, Vec<u8>>>,
    export_audio: Mutex<HashMap<String, Vec<u8>>>,
    reorder_delays: Mutex<VecDeque<Duration>>,
    story_delays: Mutex<VecDeque<Duration>>,
    fail_reorders: Mutex<bool>,
    reorder_calls: Mutex<Vec<Vec<String>>>,
}

impl MockStoryProvider {
    #[allow(unused)] // Used in tests
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_story(&self, story: Story) {
        self.stories.lock().unwrap().insert(story.id.clone(), story);
    }

    pub fn insert_clip_audio(&self, generation_id: &str, bytes: Vec<u8>) {
        self.clip_audio
            .lock()
            .unwrap()
            .insert(generation_id.to_string(), bytes);
    }

    pub fn insert_export_audio(&self, story_id: &str, bytes: Vec<u8>) {
        self.export_audio
            .lock()
            .unwrap()
            .insert(story_id.to_string(), bytes);
    }

    pub fn push_reorder_delay(&self, delay: Duration) {
        self.reorder_delays.lock().unwrap().push_back(delay);
    }

    pub fn push_story_delay(&self, delay: Duration) {
        self.story_delays.lock().unwrap().push_back(delay);
    }

    pub fn fail_reorders(&self, fail: bool) {
        *self.fail_reorders.lock().unwrap() = fail;
    }

    pub fn reorder_calls(&self) -> Vec<Vec<String>> {
        self.reorder_calls.lock().unwrap().clone()
    }

    pub fn story(&self, story_id: &str) -> Option<Story> {
        self.stories.lock().unwrap().get(story_id).cloned()
    }

    fn summary(story: &Story) -> StorySummary {
        StorySummary {
            id: story.id.clone(),
            name: story.name.clone(),
            description: story.description.clone(),
            item_count: story.items.len(),
            created_at: None,
            updated_at: None,
        }
    }

    fn not_found(what: &str) -> ApiError {
        ApiError::Server {
            status: 404,
            message: format!("{} not found", what),
        }
    }
}

#[async_trait::async_trait]
impl StoryDataProvider for MockStoryProvider {
    async fn list_stories(&self) -> Result<Vec<StorySummary>, ApiError> {
        let mut summaries: Vec<StorySummary> = self
            .stories
            .lock()
            .unwrap()
            .values()
            .map(Self::summary)
            .collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(summaries)
    }

    async fn get_story(&self, story_id: &str) -> Result<Story, ApiError> {
        let result = self.story(story_id).ok_or_else(|| Self::not_found("Story"));
        let delay = self.story_delays.lock().unwrap().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        result
    }

    async fn create_story(&self, data: &StoryCreate) -> Result<StorySummary, ApiError> {
        let story = Story {
            id: format!("story-{}", self.stories.lock().unwrap().len() + 1),
            name: data.name.clone(),
            description: data.description.clone(),
            items: Vec::new(),
        };
        let summary = Self::summary(&story);
        self.insert_story(story);
        Ok(summary)
    }

    async fn update_story(
        &self,
        story_id: &str,
        data: &StoryCreate,
    ) -> Result<StorySummary, ApiError> {
        let mut stories = self.stories.lock().unwrap();
        let story = stories
            .get_mut(story_id)
            .ok_or_else(|| Self::not_found("Story"))?;
        story.name = data.name.clone();
        story.description = data.description.clone();
        Ok(Self::summary(story))
    }

    async fn delete_story(&self, story_id: &str) -> Result<(), ApiError> {
        self.stories
            .lock()
            .unwrap()
            .remove(story_id)
            .map(|_| ())
            .ok_or_else(|| Self::not_found("Story"))
    }

    async fn add_item(&self, story_id: &str, data: &StoryItemCreate) -> Result<StoryItem, ApiError> {
        let mut stories = self.stories.lock().unwrap();
        let story = stories
            .get_mut(story_id)
            .ok_or_else(|| Self::not_found("Story"))?;
        let end = story
            .items
            .iter()
            .map(|i| i.end_ms().round() as i64)
            .max()
            .unwrap_or(0);
        let item = StoryItem::new(&data.generation_id, data.start_time_ms.unwrap_or(end), 1.0);
        story.items.push(item.clone());
        Ok(item)
    }

    async fn remove_item(&self, story_id: &str, generation_id: &str) -> Result<(), ApiError> {
        let mut stories = self.stories.lock().unwrap();
        let story = stories
            .get_mut(story_id)
            .ok_or_else(|| Self::not_found("Story"))?;
        let before = story.items.len();
        story.items.retain(|item| item.generation_id != generation_id);
        if story.items.len() == before {
            return Err(Self::not_found("Item"));
        }
        Ok(())
    }

    async fn update_item_times(
        &self,
        story_id: &str,
        data: &StoryItemBatchUpdate,
    ) -> Result<(), ApiError> {
        let mut stories = self.stories.lock().unwrap();
        let story = stories
            .get_mut(story_id)
            .ok_or_else(|| Self::not_found("Story"))?;
        for update in &data.updates {
            if let Some(item) = story
                .items
                .iter_mut()
                .find(|i| i.generation_id == update.generation_id)
            {
                item.start_time_ms = update.start_time_ms;
            }
        }
        Ok(())
    }

    async fn reorder_items(
        &self,
        story_id: &str,
        generation_ids: &[String],
    ) -> Result<Vec<StoryItem>, ApiError> {
        self.reorder_calls
            .lock()
            .unwrap()
            .push(generation_ids.to_vec());
        let delay = self.reorder_delays.lock().unwrap().pop_front();
        let fail = *self.fail_reorders.lock().unwrap();

        let result = if fail {
            Err(ApiError::Server {
                status: 500,
                message: "Reorder failed".to_string(),
            })
        } else {
            let mut stories = self.stories.lock().unwrap();
            match stories.get_mut(story_id) {
                Some(story) => {
                    let ordered: Vec<StoryItem> = generation_ids
                        .iter()
                        .filter_map(|id| story.items.iter().find(|i| &i.generation_id == id))
                        .cloned()
                        .collect();
                    story.items = provisional_layout(&ordered);
                    Ok(story.items.clone())
                }
                None => Err(Self::not_found("Story")),
            }
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        result
    }

    async fn move_item(
        &self,
        story_id: &str,
        generation_id: &str,
        data: &StoryItemMove,
    ) -> Result<StoryItem, ApiError> {
        let mut stories = self.stories.lock().unwrap();
        let story = stories
            .get_mut(story_id)
            .ok_or_else(|| Self::not_found("Story"))?;
        let item = story
            .items
            .iter_mut()
            .find(|i| i.generation_id == generation_id)
            .ok_or_else(|| Self::not_found("Item"))?;
        item.start_time_ms = data.start_time_ms;
        Ok(item.clone())
    }

    async fn export_audio(&self, story_id: &str) -> Result<Vec<u8>, ApiError> {
        self.export_audio
            .lock()
            .unwrap()
            .get(story_id)
            .cloned()
            .ok_or_else(|| Self::not_found("Story"))
    }

    async fn clip_audio(&self, generation_id: &str) -> Result<Vec<u8>, ApiError> {
        self.clip_audio
            .lock()
            .unwrap()
            .get(generation_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(generation_id.to_string()))
    }
}

/// Build a 16-bit PCM WAV file in memory
pub fn wav_bytes(sample_rate: u32, channels: u16, samples: &[i16]) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32;
    let byte_rate = sample_rate * channels as u32 * 2;
    let block_align = channels * 2;

    let mut bytes = Vec::with_capacity(44 + data_len as usize);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&channels.to_le_bytes());
    bytes.extend_from_slice(&sample_rate.to_le_bytes());
    bytes.extend_from_slice(&byte_rate.to_le_bytes());
    bytes.extend_from_slice(&block_align.to_le_bytes());
    bytes.extend_from_slice(&16u16.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

/// Story fixture with the given `(generation_id, start_ms, duration_secs)` items
pub fn story_with_items(story_id: &str, items: &[(&str, i64, f64)]) -> Story {
    Story {
        id: story_id.to_string(),
        name: format!("Story {}", story_id),
        description: None,
        items: items
            .iter()
            .map(|(id, start, duration)| StoryItem::new(id, *start, *duration))
            .collect(),
    }
}
