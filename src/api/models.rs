use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A generated speech clip placed on a story's timeline
///
/// Items arrive in insertion order, not temporal order. `generation_id` is unique within
/// a story and identifies the underlying audio; `id` only identifies the placement.
/// Missing timing fields are read as zero here, at the point of ingestion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoryItem {
    pub id: String,
    pub generation_id: String,
    /// Offset from the story origin in milliseconds
    #[serde(default, deserialize_with = "zero_if_null")]
    pub start_time_ms: i64,
    /// Clip length in seconds
    #[serde(default, deserialize_with = "zero_if_null")]
    pub duration: f64,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub profile_id: Option<String>,
    #[serde(default)]
    pub profile_name: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

fn zero_if_null<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl StoryItem {
    pub fn new(generation_id: &str, start_time_ms: i64, duration: f64) -> Self {
        Self {
            id: format!("item-{}", generation_id),
            generation_id: generation_id.to_string(),
            start_time_ms,
            duration,
            text: None,
            profile_id: None,
            profile_name: None,
            language: None,
            created_at: None,
        }
    }

    pub fn duration_ms(&self) -> f64 {
        self.duration * 1000.0
    }

    pub fn start_ms(&self) -> f64 {
        self.start_time_ms as f64
    }

    pub fn end_ms(&self) -> f64 {
        self.start_ms() + self.duration_ms()
    }
}

/// Story with its items, as returned by `GET /stories/{id}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Story {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub items: Vec<StoryItem>,
}

/// Story list entry, as returned by `GET /stories`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorySummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub item_count: usize,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryCreate {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryItemCreate {
    pub generation_id: String,
    /// Appended after the last item when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoryItemTimeUpdate {
    pub generation_id: String,
    pub start_time_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryItemBatchUpdate {
    pub updates: Vec<StoryItemTimeUpdate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoryItemReorder {
    pub generation_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryItemMove {
    pub start_time_ms: i64,
}

/// Error body returned by the backend on non-2xx responses
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    /// A string for most errors, a list for request validation failures
    pub detail: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_timing_fields_default_to_zero() {
        let json = r#"{"id": "i1", "generation_id": "g1"}"#;
        let item: StoryItem = serde_json::from_str(json).unwrap();

        assert_eq!(item.start_time_ms, 0);
        assert_eq!(item.duration, 0.0);
        assert_eq!(item.end_ms(), 0.0);
    }

    #[test]
    fn test_null_timing_fields_default_to_zero() {
        let json = r#"{"id": "i1", "generation_id": "g1", "start_time_ms": null, "duration": 1.5}"#;
        let item: StoryItem = serde_json::from_str(json).unwrap();

        assert_eq!(item.start_time_ms, 0);
        assert_eq!(item.duration, 1.5);
    }

    #[test]
    fn test_story_item_extents() {
        let item = StoryItem::new("g1", 2000, 3.0);
        assert_eq!(item.start_ms(), 2000.0);
        assert_eq!(item.duration_ms(), 3000.0);
        assert_eq!(item.end_ms(), 5000.0);
    }

    #[test]
    fn test_story_parses_backend_payload() {
        let json = r#"{
            "id": "s1",
            "name": "Chapter one",
            "description": null,
            "items": [
                {"id": "i2", "generation_id": "g2", "start_time_ms": 2000, "duration": 3.0,
                 "text": "second", "profile_name": "Narrator"},
                {"id": "i1", "generation_id": "g1", "start_time_ms": 0, "duration": 2.0}
            ]
        }"#;
        let story: Story = serde_json::from_str(json).unwrap();

        assert_eq!(story.items.len(), 2);
        assert_eq!(story.items[0].generation_id, "g2");
        assert_eq!(story.items[0].profile_name.as_deref(), Some("Narrator"));
    }
}
