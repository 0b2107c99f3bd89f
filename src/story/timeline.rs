use crate::api::models::StoryItem;
use std::sync::Arc;

/// Sorted, gap-aware projection of a story's items
///
/// Never mutated after construction; a changed item set produces a new `Timeline`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Timeline {
    pub sorted_items: Vec<StoryItem>,
    pub total_duration_ms: f64,
    pub min_start_ms: f64,
}

/// Project an unordered item set onto the virtual timeline
pub fn project(items: &[StoryItem]) -> Timeline {
    if items.is_empty() {
        return Timeline::default();
    }

    let mut sorted_items = items.to_vec();
    // sort_by_key is stable, so equal offsets keep insertion order
    sorted_items.sort_by_key(|item| item.start_time_ms);

    let total_duration_ms = sorted_items
        .iter()
        .map(StoryItem::end_ms)
        .fold(0.0, f64::max);
    let min_start_ms = sorted_items
        .iter()
        .map(|item| item.start_time_ms)
        .min()
        .unwrap_or(0) as f64;

    Timeline {
        sorted_items,
        total_duration_ms,
        min_start_ms,
    }
}

impl Timeline {
    pub fn is_empty(&self) -> bool {
        self.sorted_items.is_empty()
    }

    /// Item audible at `time_ms`: `start <= t < start + duration`
    ///
    /// Overlapping items resolve to the first one in sorted order.
    pub fn active_at(&self, time_ms: f64) -> Option<&StoryItem> {
        self.sorted_items
            .iter()
            .find(|item| item.start_ms() <= time_ms && time_ms < item.end_ms())
    }

    pub fn generation_ids(&self) -> Vec<String> {
        self.sorted_items
            .iter()
            .map(|item| item.generation_id.clone())
            .collect()
    }
}

/// A story's raw items plus a memoized projection
///
/// The projection is recomputed only when the item set's version changes, not on every
/// read, so ticks and highlight lookups can call `timeline()` freely.
#[derive(Debug, Default)]
pub struct ItemSet {
    items: Vec<StoryItem>,
    version: u64,
    cached: Option<(u64, Arc<Timeline>)>,
}

impl ItemSet {
    pub fn new(items: Vec<StoryItem>) -> Self {
        Self {
            items,
            version: 1,
            cached: None,
        }
    }

    pub fn items(&self) -> &[StoryItem] {
        &self.items
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn replace(&mut self, items: Vec<StoryItem>) {
        self.items = items;
        self.version += 1;
    }

    pub fn timeline(&mut self) -> Arc<Timeline> {
        match &self.cached {
            Some((version, timeline)) if *version == self.version => timeline.clone(),
            _ => {
                let timeline = Arc::new(project(&self.items));
                self.cached = Some((self.version, timeline.clone()));
                timeline
            }
        }
    }
}
