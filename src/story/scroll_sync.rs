use crate::playback::PlaybackSession;
use crate::story::timeline::Timeline;

/// Generation id of the item under the playhead, if the displayed story is the one playing
pub fn active_item_id<'a>(
    timeline: &'a Timeline,
    session: &PlaybackSession,
    displayed_story_id: Option<&str>,
) -> Option<&'a str> {
    if !session.is_playing || displayed_story_id.is_none() {
        return None;
    }
    if session.playback_story_id.as_deref() != displayed_story_id {
        return None;
    }

    timeline
        .active_at(session.current_time_ms)
        .map(|item| item.generation_id.as_str())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrollAction {
    pub generation_id: String,
}

/// Edge-triggered auto-scroll: one action per newly active item
#[derive(Debug, Default)]
pub struct ScrollSync {
    last_scrolled: Option<String>,
}

impl ScrollSync {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_scrolled(&self) -> Option<&str> {
        self.last_scrolled.as_deref()
    }

    /// Feed the current derivation; returns a scroll action only when the id changes
    pub fn update(&mut self, active_id: Option<&str>, is_playing: bool) -> Option<ScrollAction> {
        if !is_playing {
            self.last_scrolled = None;
            return None;
        }

        let active_id = active_id?;
        if self.last_scrolled.as_deref() == Some(active_id) {
            return None;
        }

        self.last_scrolled = Some(active_id.to_string());
        Some(ScrollAction {
            generation_id: active_id.to_string(),
        })
    }
}
