use serde::Serialize;
use tracing::debug;

/// A hardware audio clock reading in seconds
///
/// `epoch` identifies the clock instance (one per output stream). Readings are only
/// comparable within the same epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockReading {
    pub epoch: u64,
    pub seconds: f64,
}

impl ClockReading {
    pub fn new(epoch: u64, seconds: f64) -> Self {
        Self { epoch, seconds }
    }
}

/// Hardware clock time paired with the story time it corresponds to
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Anchor {
    pub epoch: u64,
    pub context_time_at_anchor: f64,
    pub story_time_at_anchor: f64,
}

/// Maps hardware clock readings to virtual story time (ms)
///
/// While anchored, story time is extrapolated from the anchor, so no drift accumulates
/// across ticks. Without an anchor the last known position is returned unchanged.
#[derive(Debug, Default)]
pub struct PlaybackClock {
    anchor: Option<Anchor>,
    current_time_ms: f64,
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the anchor; call when output has actually started, not when play was requested
    pub fn anchor(&mut self, now: ClockReading, story_time_ms: f64) {
        self.anchor = Some(Anchor {
            epoch: now.epoch,
            context_time_at_anchor: now.seconds,
            story_time_at_anchor: story_time_ms,
        });
        self.current_time_ms = story_time_ms;
    }

    pub fn invalidate(&mut self) {
        self.anchor = None;
    }

    pub fn is_anchored(&self) -> bool {
        self.anchor.is_some()
    }

    pub fn anchor_pair(&self) -> Option<Anchor> {
        self.anchor
    }

    /// Last known story time
    pub fn position(&self) -> f64 {
        self.current_time_ms
    }

    /// Jump to `time_ms`; the next advance needs a fresh anchor
    pub fn set_position(&mut self, time_ms: f64) {
        self.current_time_ms = time_ms;
        self.anchor = None;
    }

    pub fn current_story_time(&mut self, now: ClockReading) -> f64 {
        match self.anchor {
            Some(anchor) if anchor.epoch == now.epoch => {
                let elapsed_secs = (now.seconds - anchor.context_time_at_anchor).max(0.0);
                self.current_time_ms = anchor.story_time_at_anchor + elapsed_secs * 1000.0;
            }
            Some(anchor) => {
                debug!(
                    "Audio clock restarted (epoch {} -> {}), re-anchoring at {:.1}ms",
                    anchor.epoch, now.epoch, self.current_time_ms
                );
                self.anchor(now, self.current_time_ms);
            }
            None => {}
        }
        self.current_time_ms
    }
}
