use crate::api::models::StoryItem;
use std::collections::BTreeSet;
use tracing::debug;

/// One resolved drag gesture against the current sorted view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragReorderIntent {
    pub active_id: String,
    pub over_id: String,
    pub old_index: usize,
    pub new_index: usize,
}

/// Reorder request to send to the Story Data Provider
#[derive(Debug, Clone, PartialEq)]
pub struct ReorderRequest {
    /// Issuance sequence number, used to reconcile responses
    pub seq: u64,
    pub story_id: String,
    pub generation_ids: Vec<String>,
}

/// Request plus the order the UI should show until the response arrives
#[derive(Debug, Clone)]
pub struct ReorderPlan {
    pub request: ReorderRequest,
    pub optimistic_items: Vec<StoryItem>,
}

/// What to do with a reorder response or an authoritative refetch
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    /// Display these items; they are the newest authoritative order
    Applied(Vec<StoryItem>),
    /// A newer request is still in flight; keep showing its optimistic order
    Superseded,
    /// Older than something already applied; drop it
    Stale,
}

/// Resolve `active`/`over` to indices in `sorted_items`
///
/// Returns `None` for a no-op gesture or when either id is not in the view.
pub fn resolve_intent(
    active_id: &str,
    over_id: Option<&str>,
    sorted_items: &[StoryItem],
) -> Option<DragReorderIntent> {
    let over_id = over_id?;
    if active_id == over_id {
        return None;
    }

    let old_index = sorted_items
        .iter()
        .position(|item| item.generation_id == active_id)?;
    let new_index = sorted_items
        .iter()
        .position(|item| item.generation_id == over_id)?;

    Some(DragReorderIntent {
        active_id: active_id.to_string(),
        over_id: over_id.to_string(),
        old_index,
        new_index,
    })
}

/// List-move: remove at `old_index`, reinsert at `new_index`
pub fn move_item<T: Clone>(items: &[T], old_index: usize, new_index: usize) -> Vec<T> {
    let mut moved = items.to_vec();
    if old_index >= moved.len() || new_index >= moved.len() {
        return moved;
    }
    let item = moved.remove(old_index);
    moved.insert(new_index, item);
    moved
}

/// Lay items out back to back in their current order, starting at the earliest offset
pub fn provisional_layout(items: &[StoryItem]) -> Vec<StoryItem> {
    let origin = items.iter().map(|i| i.start_time_ms).min().unwrap_or(0);
    let mut cursor = origin as f64;

    items
        .iter()
        .map(|item| {
            let mut placed = item.clone();
            placed.start_time_ms = cursor.round() as i64;
            cursor += item.duration_ms();
            placed
        })
        .collect()
}

/// Turns drag gestures into reorder requests and reconciles their responses
///
/// Responses are ordered by issuance sequence number, not arrival: a slow response
/// to an older request never replaces the result of a newer one.
#[derive(Debug, Default)]
pub struct ReorderCoordinator {
    story_id: Option<String>,
    dragging: Option<String>,
    next_seq: u64,
    latest_applied: u64,
    pending: BTreeSet<u64>,
}

impl ReorderCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn story_id(&self) -> Option<&str> {
        self.story_id.as_deref()
    }

    /// Switch the displayed story; in-flight responses for the old one become stale
    pub fn set_story(&mut self, story_id: Option<String>) {
        if self.story_id != story_id {
            self.story_id = story_id;
            self.dragging = None;
            self.latest_applied = self.next_seq;
            self.pending.clear();
        }
    }

    pub fn on_drag_start(&mut self, generation_id: &str) {
        self.dragging = Some(generation_id.to_string());
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging.is_some()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn on_drag_end(
        &mut self,
        active_id: &str,
        over_id: Option<&str>,
        sorted_items: &[StoryItem],
    ) -> Option<ReorderPlan> {
        self.dragging = None;

        let story_id = self.story_id.clone()?;
        let intent = resolve_intent(active_id, over_id, sorted_items)?;

        let reordered = move_item(sorted_items, intent.old_index, intent.new_index);
        let generation_ids = reordered
            .iter()
            .map(|item| item.generation_id.clone())
            .collect();

        self.next_seq += 1;
        let seq = self.next_seq;
        self.pending.insert(seq);

        debug!(
            "Reorder #{} for story {}: {} moved {} -> {}",
            seq, story_id, intent.active_id, intent.old_index, intent.new_index
        );

        Some(ReorderPlan {
            request: ReorderRequest {
                seq,
                story_id,
                generation_ids,
            },
            optimistic_items: provisional_layout(&reordered),
        })
    }

    /// Reconcile the authoritative items returned for request `seq`
    pub fn on_response(&mut self, seq: u64, items: Vec<StoryItem>) -> Reconciliation {
        let was_pending = self.pending.remove(&seq);
        if !was_pending || seq <= self.latest_applied {
            debug!("Dropping stale reorder response #{}", seq);
            return Reconciliation::Stale;
        }

        self.latest_applied = seq;
        if self.pending.iter().any(|pending| *pending > seq) {
            debug!("Reorder response #{} superseded by a newer request", seq);
            return Reconciliation::Superseded;
        }

        Reconciliation::Applied(items)
    }

    /// Record a failed request. Returns true when the caller should refetch the story,
    /// which is the case unless a newer request will deliver authoritative items anyway.
    pub fn on_failure(&mut self, seq: u64) -> bool {
        let was_pending = self.pending.remove(&seq);
        was_pending && !self.pending.iter().any(|pending| *pending > seq)
    }

    /// Sequence number for a full story refetch about to be issued
    ///
    /// Refetches share the reorder sequence, so a slow refetch cannot replace the
    /// result of a reorder issued after it.
    pub fn begin_refetch(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    /// Reconcile the items returned by refetch `seq`
    pub fn on_refetch(&mut self, seq: u64, items: Vec<StoryItem>) -> Reconciliation {
        if seq <= self.latest_applied {
            debug!("Dropping stale refetch #{}", seq);
            return Reconciliation::Stale;
        }
        if !self.pending.is_empty() {
            return Reconciliation::Superseded;
        }

        self.latest_applied = seq;
        Reconciliation::Applied(items)
    }
}
