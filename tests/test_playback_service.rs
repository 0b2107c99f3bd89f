#![cfg(feature = "test-utils")]

mod support;

use std::sync::Arc;
use std::time::Duration;

use crate::support::{eventually, tracing_init, wait_for};
use voicebox::api::StoryItem;
use voicebox::playback::{
    PlaybackProgress, StoryPlaybackHandle, StoryPlaybackService, StoryProgress,
};
use voicebox::story::project;
use voicebox::test_support::{
    story_with_items, wav_bytes, ManualAudioOutput, MockStoryProvider, OutputCall,
};

const WAIT: Duration = Duration::from_secs(5);

struct ServiceFixture {
    handle: StoryPlaybackHandle,
    progress_rx: tokio::sync::mpsc::UnboundedReceiver<StoryProgress>,
    provider: Arc<MockStoryProvider>,
    output: ManualAudioOutput,
}

impl ServiceFixture {
    fn new(items: &[(&str, i64, f64)]) -> Self {
        tracing_init();

        let provider = Arc::new(MockStoryProvider::new());
        provider.insert_story(story_with_items("s1", items));
        for (generation_id, _, _) in items {
            provider.insert_clip_audio(generation_id, wav_bytes(8000, 1, &[0i16; 800]));
        }

        let output = ManualAudioOutput::new();
        let service_output = output.clone();
        let handle = StoryPlaybackService::start_with_output(
            provider.clone(),
            move || Ok(service_output),
            Duration::from_millis(5),
            false,
        );
        let progress_rx = handle.subscribe_progress();

        Self {
            handle,
            progress_rx,
            provider,
            output,
        }
    }

    /// Open s1 and wait until its items are shown
    async fn open(&mut self) -> Vec<String> {
        self.handle.open_story("s1");
        self.next_items(true).await
    }

    async fn next_items(&mut self, authoritative: bool) -> Vec<String> {
        wait_for(&mut self.progress_rx, WAIT, |event| match event {
            StoryProgress::ItemsChanged {
                items,
                authoritative: a,
                ..
            } if a == authoritative => Some(ordered_ids(&items)),
            _ => None,
        })
        .await
    }

    async fn next_scroll(&mut self) -> String {
        wait_for(&mut self.progress_rx, WAIT, |event| match event {
            StoryProgress::ScrollTo { generation_id } => Some(generation_id),
            _ => None,
        })
        .await
    }

    async fn next_failure(&mut self) -> String {
        wait_for(&mut self.progress_rx, WAIT, |event| match event {
            StoryProgress::RequestFailed { message } => Some(message),
            _ => None,
        })
        .await
    }
}

fn ordered_ids(items: &[StoryItem]) -> Vec<String> {
    project(items).generation_ids()
}

fn abc() -> Vec<(&'static str, i64, f64)> {
    vec![("A", 0, 1.0), ("B", 1000, 1.0), ("C", 2000, 1.0)]
}

#[tokio::test]
async fn test_open_loads_items_and_clips() {
    let mut fx = ServiceFixture::new(&[("g2", 2000, 3.0), ("g1", 0, 2.0)]);

    assert_eq!(fx.open().await, vec!["g1", "g2"]);

    let output = fx.output.clone();
    eventually(WAIT, || output.loaded_clips() == vec!["g1", "g2"]).await;
}

#[tokio::test]
async fn test_playback_scrolls_to_each_item() {
    let mut fx = ServiceFixture::new(&[("g2", 2000, 3.0), ("g1", 0, 2.0)]);
    fx.open().await;
    let output = fx.output.clone();
    eventually(WAIT, || output.loaded_clips().len() == 2).await;

    fx.handle.play();
    assert_eq!(fx.next_scroll().await, "g1");

    // Position updates start once the clock is anchored
    wait_for(&mut fx.progress_rx, WAIT, |event| match event {
        StoryProgress::Playback(PlaybackProgress::PositionUpdate { .. }) => Some(()),
        _ => None,
    })
    .await;

    fx.output.advance(2.5);
    assert_eq!(fx.next_scroll().await, "g2");
    assert_eq!(
        fx.output.last_play(),
        Some(OutputCall::Play {
            generation_id: "g2".to_string(),
            offset_ms: 500.0
        })
    );
}

#[tokio::test]
async fn test_seek_while_paused_reports_position() {
    let mut fx = ServiceFixture::new(&[("g1", 0, 2.0), ("g2", 2000, 3.0)]);
    fx.open().await;

    fx.handle.play();
    fx.handle.pause();
    fx.handle.seek(2500.0);

    let position = wait_for(&mut fx.progress_rx, WAIT, |event| match event {
        StoryProgress::Playback(PlaybackProgress::Seeked { position_ms }) => Some(position_ms),
        _ => None,
    })
    .await;
    assert_eq!(position, 2500.0);
}

#[tokio::test]
async fn test_late_reorder_response_is_discarded() {
    let mut fx = ServiceFixture::new(&abc());
    fx.open().await;

    // First reorder's response is held back
    fx.provider.push_reorder_delay(Duration::from_millis(300));

    fx.handle.drag_start("C");
    fx.handle.drag_end("C", Some("A"));
    assert_eq!(fx.next_items(false).await, vec!["C", "A", "B"]);

    let provider = fx.provider.clone();
    eventually(WAIT, || provider.reorder_calls().len() == 1).await;

    fx.handle.drag_start("B");
    fx.handle.drag_end("B", Some("C"));
    assert_eq!(fx.next_items(false).await, vec!["B", "C", "A"]);
    assert_eq!(fx.next_items(true).await, vec!["B", "C", "A"]);

    // The delayed response for the first reorder must not show up
    let late = tokio::time::timeout(Duration::from_millis(600), async {
        while let Some(event) = fx.progress_rx.recv().await {
            if let StoryProgress::ItemsChanged { items, .. } = event {
                return Some(ordered_ids(&items));
            }
        }
        None
    })
    .await;
    assert!(!matches!(late, Ok(Some(_))), "unexpected update: {:?}", late);
}

#[tokio::test]
async fn test_failed_reorder_refetches_server_order() {
    let mut fx = ServiceFixture::new(&abc());
    fx.open().await;
    fx.provider.fail_reorders(true);

    fx.handle.drag_end("C", Some("A"));
    assert_eq!(fx.next_failure().await, "Reorder failed");
    assert_eq!(fx.next_items(true).await, vec!["A", "B", "C"]);
}

#[tokio::test]
async fn test_slow_refetch_after_failure_keeps_newer_reorder() {
    let mut fx = ServiceFixture::new(&abc());
    fx.open().await;

    // The refetch issued after the failed reorder is slow
    fx.provider.fail_reorders(true);
    fx.provider.push_story_delay(Duration::from_millis(300));

    fx.handle.drag_end("C", Some("A"));
    assert_eq!(fx.next_items(false).await, vec!["C", "A", "B"]);
    assert_eq!(fx.next_failure().await, "Reorder failed");

    fx.provider.fail_reorders(false);
    fx.handle.drag_end("B", Some("C"));
    assert_eq!(fx.next_items(false).await, vec!["B", "C", "A"]);
    assert_eq!(fx.next_items(true).await, vec!["B", "C", "A"]);

    // The refetch lands after the newer reorder and must not replace it
    let late = tokio::time::timeout(Duration::from_millis(600), async {
        while let Some(event) = fx.progress_rx.recv().await {
            if let StoryProgress::ItemsChanged { items, .. } = event {
                return Some(ordered_ids(&items));
            }
        }
        None
    })
    .await;
    assert!(!matches!(late, Ok(Some(_))), "unexpected update: {:?}", late);
    assert_eq!(
        fx.provider.story("s1").map(|s| project(&s.items).generation_ids()),
        Some(vec!["B".to_string(), "C".to_string(), "A".to_string()])
    );
}

#[tokio::test]
async fn test_drop_on_self_sends_nothing() {
    let mut fx = ServiceFixture::new(&abc());
    fx.open().await;

    fx.handle.drag_start("B");
    fx.handle.drag_end("B", Some("B"));
    fx.handle.drag_end("B", None);
    fx.handle.refresh();

    assert_eq!(fx.next_items(true).await, vec!["A", "B", "C"]);
    assert!(fx.provider.reorder_calls().is_empty());
}

#[tokio::test]
async fn test_remove_item_refreshes_story() {
    let mut fx = ServiceFixture::new(&abc());
    fx.open().await;

    fx.handle.remove_item("B");
    assert_eq!(fx.next_items(true).await, vec!["A", "C"]);
}

#[tokio::test]
async fn test_missing_story_reports_server_message() {
    let mut fx = ServiceFixture::new(&abc());

    fx.handle.open_story("nope");
    assert_eq!(fx.next_failure().await, "Story not found");
}
