use crate::api::models::StoryItem;
use crate::playback::clock::{Anchor, PlaybackClock};
use crate::playback::output::AudioOutput;
use crate::playback::progress::{PlaybackProgress, PlaybackProgressHandle};
use crate::story::timeline::{project, Timeline};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc as tokio_mpsc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlaybackStatus {
    Stopped,
    Playing,
    Paused,
}

/// Read-only snapshot of the live playback session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackSession {
    pub playback_story_id: Option<String>,
    pub is_playing: bool,
    pub current_time_ms: f64,
    pub total_duration_ms: f64,
    pub anchor: Option<Anchor>,
}

/// Story playback state machine: Stopped -> Playing <-> Paused -> Stopped
///
/// Owns the one live playback session. Story time comes from `PlaybackClock`, which
/// is anchored on the first tick after play/resume/seek where the output reports a
/// running clock. Ticks pick the audible item and forward clip transitions to `O`.
pub struct PlaybackController<O: AudioOutput> {
    output: O,
    clock: PlaybackClock,
    status: PlaybackStatus,
    story_id: Option<String>,
    timeline: Arc<Timeline>,
    active_item: Option<String>,
    looping: bool,
    progress: PlaybackProgressHandle,
}

impl<O: AudioOutput> PlaybackController<O> {
    pub fn new(output: O) -> Self {
        Self {
            output,
            clock: PlaybackClock::new(),
            status: PlaybackStatus::Stopped,
            story_id: None,
            timeline: Arc::new(Timeline::default()),
            active_item: None,
            looping: false,
            progress: PlaybackProgressHandle::new(),
        }
    }

    pub fn subscribe(&self) -> tokio_mpsc::UnboundedReceiver<PlaybackProgress> {
        self.progress.subscribe_all()
    }

    pub fn status(&self) -> PlaybackStatus {
        self.status
    }

    pub fn story_id(&self) -> Option<&str> {
        self.story_id.as_deref()
    }

    pub fn timeline(&self) -> &Arc<Timeline> {
        &self.timeline
    }

    pub fn active_item(&self) -> Option<&str> {
        self.active_item.as_deref()
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut O {
        &mut self.output
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    pub fn session(&self) -> PlaybackSession {
        PlaybackSession {
            playback_story_id: self.story_id.clone(),
            is_playing: self.status == PlaybackStatus::Playing,
            current_time_ms: self.clock.position(),
            total_duration_ms: self.timeline.total_duration_ms,
            anchor: self.clock.anchor_pair(),
        }
    }

    pub fn play(&mut self, story_id: &str, items: &[StoryItem]) {
        self.play_timeline(story_id, Arc::new(project(items)));
    }

    /// Start or resume `story_id`
    ///
    /// Resumes in place when the same story has a non-zero position; otherwise starts at
    /// the first item. A different live story is torn down first.
    pub fn play_timeline(&mut self, story_id: &str, timeline: Arc<Timeline>) {
        let same_story = self.story_id.as_deref() == Some(story_id);
        if !same_story && self.story_id.is_some() {
            debug!("Switching playback to story {}", story_id);
            self.teardown();
        }

        let resume = same_story && self.clock.position() > 0.0;
        let start_ms = if resume {
            self.clock.position()
        } else {
            timeline.min_start_ms
        };

        info!(
            "Play story {} at {:.1}ms ({} items, {:.1}ms total, resume: {})",
            story_id,
            start_ms,
            timeline.sorted_items.len(),
            timeline.total_duration_ms,
            resume
        );

        self.timeline = timeline;
        self.story_id = Some(story_id.to_string());
        self.clock.set_position(start_ms);
        self.silence();
        self.set_status(PlaybackStatus::Playing);
    }

    pub fn pause(&mut self) {
        if self.status != PlaybackStatus::Playing {
            return;
        }

        if let Some(now) = self.output.clock() {
            self.clock.current_story_time(now);
        }
        self.clock.invalidate();
        self.silence();
        self.set_status(PlaybackStatus::Paused);
    }

    /// Idempotent; callable from any state
    pub fn stop(&mut self) {
        let was_live = self.status != PlaybackStatus::Stopped || self.story_id.is_some();
        self.teardown();
        if was_live {
            self.set_status(PlaybackStatus::Stopped);
        }
    }

    /// Move the playhead, clamped to `[0, total]`; play/pause state is unchanged
    pub fn seek(&mut self, time_ms: f64) {
        let time_ms = if time_ms.is_nan() { 0.0 } else { time_ms };
        let clamped = time_ms.clamp(0.0, self.timeline.total_duration_ms.max(0.0));

        self.clock.set_position(clamped);
        if self.status == PlaybackStatus::Playing {
            self.silence();
        }
        self.progress.publish(PlaybackProgress::Seeked {
            position_ms: clamped,
        });
    }

    /// Replace the live story's timeline after an authoritative refresh
    ///
    /// Ignored for any story other than the live one. The playhead stays put unless the
    /// new timeline is shorter.
    pub fn refresh_timeline(&mut self, story_id: &str, timeline: Arc<Timeline>) {
        if self.story_id.as_deref() != Some(story_id) || Arc::ptr_eq(&self.timeline, &timeline) {
            return;
        }

        let position = self.clock.position();
        if position > timeline.total_duration_ms {
            self.clock.set_position(timeline.total_duration_ms);
        }
        self.timeline = timeline;
        if self.status == PlaybackStatus::Playing {
            self.silence();
        }
    }

    pub fn refresh_items(&mut self, story_id: &str, items: &[StoryItem]) {
        self.refresh_timeline(story_id, Arc::new(project(items)));
    }

    /// Restart the audible clip on the next tick, e.g. after its audio finished loading
    pub fn resync(&mut self) {
        if self.status == PlaybackStatus::Playing {
            self.silence();
        }
    }

    /// Per-frame duty while playing
    pub fn tick(&mut self) {
        if self.status != PlaybackStatus::Playing {
            return;
        }
        let Some(story_id) = self.story_id.clone() else {
            return;
        };
        let Some(now) = self.output.clock() else {
            // Output not running yet; anchor once it is
            return;
        };

        if !self.clock.is_anchored() {
            let position = self.clock.position();
            self.clock.anchor(now, position);
        }
        let mut position = self.clock.current_story_time(now);

        if position >= self.timeline.total_duration_ms {
            if self.looping && self.timeline.total_duration_ms > 0.0 {
                position = self.timeline.min_start_ms;
                self.clock.anchor(now, position);
                self.silence();
                info!("Looping story {}", story_id);
                self.progress.publish(PlaybackProgress::Looped {
                    story_id: story_id.clone(),
                });
            } else {
                info!("Story {} finished", story_id);
                self.progress.publish(PlaybackProgress::Finished { story_id });
                self.stop();
                return;
            }
        }

        self.progress.publish(PlaybackProgress::PositionUpdate {
            story_id: story_id.clone(),
            position_ms: position,
        });

        let active = self
            .timeline
            .active_at(position)
            .map(|item| (item.generation_id.clone(), position - item.start_ms()));
        let active_id = active.as_ref().map(|(id, _)| id.clone());
        if active_id == self.active_item {
            return;
        }

        match &active {
            Some((generation_id, offset_ms)) => {
                debug!("Clip {} at +{:.1}ms", generation_id, offset_ms);
                self.output.play_clip(generation_id, *offset_ms);
            }
            None => self.output.stop(),
        }

        let from = std::mem::replace(&mut self.active_item, active_id.clone());
        self.progress.publish(PlaybackProgress::ClipTransition {
            story_id,
            from,
            to: active_id,
        });
    }

    /// Silence output and forget the audible item so the next tick re-selects it
    fn silence(&mut self) {
        self.output.stop();
        self.active_item = None;
    }

    fn teardown(&mut self) {
        self.silence();
        self.clock.set_position(0.0);
        self.story_id = None;
        self.timeline = Arc::new(Timeline::default());
    }

    fn set_status(&mut self, status: PlaybackStatus) {
        self.status = status;
        self.progress.publish(PlaybackProgress::StateChanged {
            status,
            story_id: self.story_id.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ManualAudioOutput, OutputCall};

    fn items() -> Vec<StoryItem> {
        vec![
            StoryItem::new("g2", 2000, 3.0),
            StoryItem::new("g1", 0, 2.0),
        ]
    }

    fn controller() -> (PlaybackController<ManualAudioOutput>, ManualAudioOutput) {
        let output = ManualAudioOutput::new();
        (PlaybackController::new(output.clone()), output)
    }

    #[test]
    fn test_initial_state_is_stopped() {
        let (c, _) = controller();
        let session = c.session();
        assert_eq!(c.status(), PlaybackStatus::Stopped);
        assert!(!session.is_playing);
        assert_eq!(session.current_time_ms, 0.0);
        assert_eq!(session.playback_story_id, None);
    }

    #[test]
    fn test_play_starts_at_first_item() {
        let (mut c, _) = controller();
        let late = vec![StoryItem::new("a", 1500, 1.0), StoryItem::new("b", 4000, 1.0)];
        c.play("s1", &late);

        let session = c.session();
        assert!(session.is_playing);
        assert_eq!(session.current_time_ms, 1500.0);
        assert_eq!(session.total_duration_ms, 5000.0);
        assert_eq!(session.playback_story_id.as_deref(), Some("s1"));
    }

    #[test]
    fn test_first_tick_anchors_and_starts_clip() {
        let (mut c, output) = controller();
        output.set_clock(10.0);
        c.play("s1", &items());
        assert!(c.session().anchor.is_none());

        c.tick();
        let anchor = c.session().anchor.unwrap();
        assert_eq!(anchor.context_time_at_anchor, 10.0);
        assert_eq!(anchor.story_time_at_anchor, 0.0);
        assert_eq!(
            output.last_play(),
            Some(OutputCall::Play {
                generation_id: "g1".to_string(),
                offset_ms: 0.0
            })
        );
    }

    #[test]
    fn test_no_anchor_until_output_clock_runs() {
        let (mut c, output) = controller();
        output.halt_clock();
        c.play("s1", &items());
        c.tick();
        assert!(c.session().anchor.is_none());
        assert!(output.last_play().is_none());
    }

    #[test]
    fn test_ticks_cross_item_boundary() {
        let (mut c, output) = controller();
        c.play("s1", &items());
        c.tick();

        output.advance(2.5);
        c.tick();
        assert_eq!(c.session().current_time_ms, 2500.0);
        assert_eq!(c.active_item(), Some("g2"));
        assert_eq!(
            output.last_play(),
            Some(OutputCall::Play {
                generation_id: "g2".to_string(),
                offset_ms: 500.0
            })
        );

        // Same item on the next tick: no new transition
        let plays = output.play_count();
        output.advance(0.25);
        c.tick();
        assert_eq!(output.play_count(), plays);
    }

    #[test]
    fn test_pause_then_resume_keeps_position() {
        let (mut c, output) = controller();
        c.play("s1", &items());
        c.tick();
        output.advance(1.5);
        c.tick();

        c.pause();
        assert_eq!(c.status(), PlaybackStatus::Paused);
        assert!(c.session().anchor.is_none());
        assert_eq!(c.session().current_time_ms, 1500.0);

        output.advance(30.0);
        c.play("s1", &items());
        assert_eq!(c.session().current_time_ms, 1500.0);
        c.tick();
        assert_eq!(c.session().current_time_ms, 1500.0);
        assert_eq!(
            output.last_play(),
            Some(OutputCall::Play {
                generation_id: "g1".to_string(),
                offset_ms: 500.0
            })
        );
    }

    #[test]
    fn test_pause_is_noop_unless_playing() {
        let (mut c, _) = controller();
        c.pause();
        assert_eq!(c.status(), PlaybackStatus::Stopped);
    }

    #[test]
    fn test_stop_resets_from_any_state() {
        let (mut c, output) = controller();
        c.play("s1", &items());
        c.tick();
        output.advance(1.0);
        c.tick();
        c.pause();

        c.stop();
        let session = c.session();
        assert!(!session.is_playing);
        assert_eq!(session.current_time_ms, 0.0);
        assert_eq!(session.total_duration_ms, 0.0);
        assert_eq!(session.playback_story_id, None);
        assert!(session.anchor.is_none());

        // Idempotent
        c.stop();
        assert_eq!(c.status(), PlaybackStatus::Stopped);
    }

    #[test]
    fn test_seek_clamps_to_story() {
        let (mut c, _) = controller();
        c.play("s1", &[StoryItem::new("g1", 0, 1.0)]);

        c.seek(-50.0);
        assert_eq!(c.session().current_time_ms, 0.0);
        c.seek(5000.0);
        assert_eq!(c.session().current_time_ms, 1000.0);
        c.seek(f64::NAN);
        assert_eq!(c.session().current_time_ms, 0.0);
    }

    #[test]
    fn test_seek_while_playing_reanchors_on_next_tick() {
        let (mut c, output) = controller();
        c.play("s1", &items());
        c.tick();
        output.advance(1.0);
        c.tick();

        c.seek(3000.0);
        assert!(c.session().anchor.is_none());
        assert_eq!(c.status(), PlaybackStatus::Playing);

        output.advance(5.0);
        c.tick();
        assert_eq!(c.session().current_time_ms, 3000.0);
        assert_eq!(
            output.last_play(),
            Some(OutputCall::Play {
                generation_id: "g2".to_string(),
                offset_ms: 1000.0
            })
        );
    }

    #[test]
    fn test_switching_story_starts_fresh() {
        let (mut c, output) = controller();
        c.play("s1", &items());
        c.tick();
        output.advance(1.0);
        c.tick();

        c.play("s2", &[StoryItem::new("x", 500, 1.0)]);
        let session = c.session();
        assert_eq!(session.playback_story_id.as_deref(), Some("s2"));
        assert_eq!(session.current_time_ms, 500.0);
        assert_eq!(session.total_duration_ms, 1500.0);
        assert!(session.anchor.is_none());
    }

    #[test]
    fn test_reaching_end_stops_and_reports_finish() {
        let (mut c, output) = controller();
        let mut rx = c.subscribe();
        c.play("s1", &items());
        c.tick();
        output.advance(5.0);
        c.tick();

        assert_eq!(c.status(), PlaybackStatus::Stopped);
        assert_eq!(c.session().current_time_ms, 0.0);

        let mut finished = false;
        while let Ok(event) = rx.try_recv() {
            if event == (PlaybackProgress::Finished {
                story_id: "s1".to_string(),
            }) {
                finished = true;
            }
        }
        assert!(finished);
    }

    #[test]
    fn test_loop_restarts_at_first_item() {
        let (mut c, output) = controller();
        c.set_looping(true);
        c.play("s1", &[StoryItem::new("a", 1000, 1.0)]);
        c.tick();
        output.advance(1.25);
        c.tick();

        assert_eq!(c.status(), PlaybackStatus::Playing);
        assert_eq!(c.session().current_time_ms, 1000.0);
        assert_eq!(c.session().anchor.unwrap().story_time_at_anchor, 1000.0);

        output.advance(0.5);
        c.tick();
        assert_eq!(c.session().current_time_ms, 1500.0);
    }

    #[test]
    fn test_gap_silences_output() {
        let (mut c, output) = controller();
        c.play(
            "s1",
            &[StoryItem::new("a", 0, 1.0), StoryItem::new("b", 3000, 1.0)],
        );
        c.tick();
        output.advance(2.0);
        c.tick();

        assert_eq!(c.active_item(), None);
        assert_eq!(output.calls().last(), Some(&OutputCall::Stop));
    }

    #[test]
    fn test_refresh_only_touches_live_story() {
        let (mut c, _) = controller();
        c.play("s1", &items());
        c.refresh_items("other", &[StoryItem::new("z", 0, 60.0)]);
        assert_eq!(c.session().total_duration_ms, 5000.0);

        c.refresh_items("s1", &[StoryItem::new("g1", 0, 1.0)]);
        assert_eq!(c.session().total_duration_ms, 1000.0);
    }

    #[test]
    fn test_empty_story_finishes_on_first_tick() {
        let (mut c, _) = controller();
        c.play("s1", &[]);
        c.tick();
        assert_eq!(c.status(), PlaybackStatus::Stopped);
    }
}
