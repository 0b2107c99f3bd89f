use crate::api::models::{Story, StoryItem};
use crate::api::ApiError;
use crate::playback::controller::PlaybackController;
use crate::playback::cpal_output::{AudioError, CpalAudioOutput};
use crate::playback::output::{AudioOutput, DecodedClip};
use crate::playback::progress::{PlaybackProgress, ProgressHandle};
use crate::playback::symphonia_decoder::decode_clip;
use crate::story::provider::StoryDataProvider;
use crate::story::reorder::{Reconciliation, ReorderCoordinator};
use crate::story::scroll_sync::{active_item_id, ScrollSync};
use crate::story::timeline::ItemSet;
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc as tokio_mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

// Clip downloads in flight at once per story load
const CLIP_FETCH_CONCURRENCY: usize = 4;

/// Commands sent to the story playback service
#[derive(Debug, Clone)]
pub enum StoryCommand {
    /// Display a story (fetches its items)
    OpenStory(String),
    /// Play or resume the displayed story
    Play,
    Pause,
    Stop,
    /// Story time in ms
    Seek(f64),
    SetLooping(bool),
    DragStart(String),
    DragEnd {
        active_id: String,
        over_id: Option<String>,
    },
    RemoveItem(String),
    /// Refetch the displayed story
    Refresh,
}

/// Events broadcast to every subscriber of the service
#[derive(Debug, Clone, PartialEq)]
pub enum StoryProgress {
    Playback(PlaybackProgress),
    /// Displayed items changed; `authoritative` is false for an optimistic reorder view
    ItemsChanged {
        story_id: String,
        items: Vec<StoryItem>,
        authoritative: bool,
    },
    /// Bring this item into view
    ScrollTo { generation_id: String },
    RequestFailed { message: String },
}

/// Handle to the story playback service for sending commands
#[derive(Clone)]
pub struct StoryPlaybackHandle {
    command_tx: tokio_mpsc::UnboundedSender<StoryCommand>,
    progress_handle: ProgressHandle<StoryProgress>,
}

impl StoryPlaybackHandle {
    pub fn send(&self, command: StoryCommand) {
        if self.command_tx.send(command).is_err() {
            warn!("Story playback service is not running");
        }
    }

    pub fn open_story(&self, story_id: &str) {
        self.send(StoryCommand::OpenStory(story_id.to_string()));
    }

    pub fn play(&self) {
        self.send(StoryCommand::Play);
    }

    pub fn pause(&self) {
        self.send(StoryCommand::Pause);
    }

    pub fn stop(&self) {
        self.send(StoryCommand::Stop);
    }

    pub fn seek(&self, time_ms: f64) {
        self.send(StoryCommand::Seek(time_ms));
    }

    pub fn set_looping(&self, looping: bool) {
        self.send(StoryCommand::SetLooping(looping));
    }

    pub fn drag_start(&self, generation_id: &str) {
        self.send(StoryCommand::DragStart(generation_id.to_string()));
    }

    pub fn drag_end(&self, active_id: &str, over_id: Option<&str>) {
        self.send(StoryCommand::DragEnd {
            active_id: active_id.to_string(),
            over_id: over_id.map(str::to_string),
        });
    }

    pub fn remove_item(&self, generation_id: &str) {
        self.send(StoryCommand::RemoveItem(generation_id.to_string()));
    }

    pub fn refresh(&self) {
        self.send(StoryCommand::Refresh);
    }

    pub fn subscribe_progress(&self) -> tokio_mpsc::UnboundedReceiver<StoryProgress> {
        self.progress_handle.subscribe_all()
    }
}

/// Results of spawned requests, fed back into the service loop
enum ServiceEvent {
    StoryFetched {
        story_id: String,
        seq: u64,
        result: Result<Story, ApiError>,
    },
    Reordered {
        story_id: String,
        seq: u64,
        result: Result<Vec<StoryItem>, ApiError>,
    },
    ItemRemoved {
        story_id: String,
        generation_id: String,
        result: Result<(), ApiError>,
    },
    ClipLoaded {
        generation_id: String,
        result: Result<DecodedClip, String>,
    },
}

/// Runs the playback controller, reorder coordinator and scroll sync on one thread
///
/// Commands, request results and ticks are handled in the order they arrive. Network
/// requests run as separate tasks and report back through `ServiceEvent`.
pub struct StoryPlaybackService<O: AudioOutput> {
    provider: Arc<dyn StoryDataProvider>,
    controller: PlaybackController<O>,
    playback_rx: tokio_mpsc::UnboundedReceiver<PlaybackProgress>,
    command_rx: tokio_mpsc::UnboundedReceiver<StoryCommand>,
    event_tx: tokio_mpsc::UnboundedSender<ServiceEvent>,
    event_rx: tokio_mpsc::UnboundedReceiver<ServiceEvent>,
    progress_handle: ProgressHandle<StoryProgress>,
    displayed_story_id: Option<String>,
    items: ItemSet,
    reorder: ReorderCoordinator,
    scroll: ScrollSync,
    clips_in_flight: HashSet<String>,
}

impl StoryPlaybackService<CpalAudioOutput> {
    /// Start the service on the default output device
    pub fn start(
        provider: Arc<dyn StoryDataProvider>,
        tick_interval: Duration,
        looping: bool,
    ) -> StoryPlaybackHandle {
        Self::start_with_output(provider, CpalAudioOutput::new, tick_interval, looping)
    }
}

impl<O: AudioOutput + 'static> StoryPlaybackService<O> {
    /// Start the service with an output built by `make_output` on the service thread
    pub fn start_with_output<F>(
        provider: Arc<dyn StoryDataProvider>,
        make_output: F,
        tick_interval: Duration,
        looping: bool,
    ) -> StoryPlaybackHandle
    where
        F: FnOnce() -> Result<O, AudioError> + Send + 'static,
    {
        let (command_tx, command_rx) = tokio_mpsc::unbounded_channel();
        let progress_handle = ProgressHandle::new();

        let handle = StoryPlaybackHandle {
            command_tx,
            progress_handle: progress_handle.clone(),
        };

        // Dedicated thread: the cpal stream isn't Send
        std::thread::spawn(move || {
            let rt = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    error!("Failed to create playback runtime: {}", e);
                    return;
                }
            };

            rt.block_on(async move {
                let output = match make_output() {
                    Ok(output) => output,
                    Err(e) => {
                        error!("Failed to initialize audio output: {}", e);
                        return;
                    }
                };

                let mut controller = PlaybackController::new(output);
                controller.set_looping(looping);
                let playback_rx = controller.subscribe();
                let (event_tx, event_rx) = tokio_mpsc::unbounded_channel();

                let mut service = StoryPlaybackService {
                    provider,
                    controller,
                    playback_rx,
                    command_rx,
                    event_tx,
                    event_rx,
                    progress_handle,
                    displayed_story_id: None,
                    items: ItemSet::default(),
                    reorder: ReorderCoordinator::new(),
                    scroll: ScrollSync::new(),
                    clips_in_flight: HashSet::new(),
                };

                service.run(tick_interval).await;
            });
        });

        handle
    }

    async fn run(&mut self, tick_interval: Duration) {
        info!("StoryPlaybackService started");

        let mut ticker = tokio::time::interval(tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                command = self.command_rx.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(event) = self.event_rx.recv() => self.handle_event(event),
                _ = ticker.tick() => self.controller.tick(),
            }

            self.forward_playback_events();
            self.sync_scroll();
        }

        self.controller.stop();
        self.forward_playback_events();
        info!("StoryPlaybackService stopped");
    }

    fn handle_command(&mut self, command: StoryCommand) {
        debug!("Story command: {:?}", command);

        match command {
            StoryCommand::OpenStory(story_id) => self.open_story(story_id),
            StoryCommand::Play => {
                let Some(story_id) = self.displayed_story_id.clone() else {
                    warn!("Play requested with no story open");
                    return;
                };
                let timeline = self.items.timeline();
                self.controller.play_timeline(&story_id, timeline);
            }
            StoryCommand::Pause => self.controller.pause(),
            StoryCommand::Stop => self.controller.stop(),
            StoryCommand::Seek(time_ms) => self.controller.seek(time_ms),
            StoryCommand::SetLooping(looping) => self.controller.set_looping(looping),
            StoryCommand::DragStart(generation_id) => self.reorder.on_drag_start(&generation_id),
            StoryCommand::DragEnd { active_id, over_id } => {
                self.drag_end(&active_id, over_id.as_deref())
            }
            StoryCommand::RemoveItem(generation_id) => self.remove_item(generation_id),
            StoryCommand::Refresh => {
                if let Some(story_id) = self.displayed_story_id.clone() {
                    self.fetch_story(story_id);
                }
            }
        }
    }

    fn handle_event(&mut self, event: ServiceEvent) {
        match event {
            ServiceEvent::StoryFetched {
                story_id,
                seq,
                result,
            } => {
                if self.displayed_story_id.as_deref() != Some(story_id.as_str()) {
                    debug!("Ignoring fetch of story {} that is no longer displayed", story_id);
                    return;
                }
                match result {
                    Ok(story) => match self.reorder.on_refetch(seq, story.items) {
                        Reconciliation::Applied(items) => self.apply_items(items, true),
                        Reconciliation::Superseded => {
                            debug!("Refetch of {} superseded by pending reorder", story_id)
                        }
                        Reconciliation::Stale => {
                            debug!("Refetch #{} of {} is older than the shown order", seq, story_id)
                        }
                    },
                    Err(e) => self.request_failed("Failed to load story", &e),
                }
            }
            ServiceEvent::Reordered {
                story_id,
                seq,
                result,
            } => {
                if self.reorder.story_id() != Some(story_id.as_str()) {
                    debug!("Dropping reorder #{} for story {}", seq, story_id);
                    return;
                }
                match result {
                    Ok(items) => {
                        if let Reconciliation::Applied(items) = self.reorder.on_response(seq, items)
                        {
                            self.apply_items(items, true);
                        }
                    }
                    Err(e) => {
                        self.request_failed("Failed to reorder items", &e);
                        if self.reorder.on_failure(seq) {
                            self.fetch_story(story_id);
                        }
                    }
                }
            }
            ServiceEvent::ItemRemoved {
                story_id,
                generation_id,
                result,
            } => match result {
                Ok(()) => {
                    info!("Removed {} from story {}", generation_id, story_id);
                    if self.displayed_story_id.as_deref() == Some(story_id.as_str()) {
                        self.fetch_story(story_id);
                    }
                }
                Err(e) => self.request_failed("Failed to remove item", &e),
            },
            ServiceEvent::ClipLoaded {
                generation_id,
                result,
            } => {
                self.clips_in_flight.remove(&generation_id);
                match result {
                    Ok(clip) => {
                        debug!(
                            "Loaded clip {} ({:.2}s)",
                            generation_id,
                            clip.duration_secs()
                        );
                        self.controller.output_mut().load_clip(&generation_id, clip);
                        if self.controller.active_item() == Some(generation_id.as_str()) {
                            self.controller.resync();
                        }
                    }
                    Err(message) => {
                        warn!("Failed to load clip {}: {}", generation_id, message);
                        self.progress_handle
                            .publish(StoryProgress::RequestFailed { message });
                    }
                }
            }
        }
    }

    fn open_story(&mut self, story_id: String) {
        if self.displayed_story_id.as_deref() != Some(story_id.as_str()) {
            info!("Opening story {}", story_id);
            self.displayed_story_id = Some(story_id.clone());
            self.reorder.set_story(Some(story_id.clone()));
            self.scroll = ScrollSync::new();
            self.items.replace(Vec::new());
        }
        self.fetch_story(story_id);
    }

    fn drag_end(&mut self, active_id: &str, over_id: Option<&str>) {
        let timeline = self.items.timeline();
        let Some(plan) = self
            .reorder
            .on_drag_end(active_id, over_id, &timeline.sorted_items)
        else {
            return;
        };

        self.apply_items(plan.optimistic_items, false);

        let request = plan.request;
        let provider = self.provider.clone();
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            let result = provider
                .reorder_items(&request.story_id, &request.generation_ids)
                .await;
            let _ = event_tx.send(ServiceEvent::Reordered {
                story_id: request.story_id,
                seq: request.seq,
                result,
            });
        });
    }

    fn remove_item(&mut self, generation_id: String) {
        let Some(story_id) = self.displayed_story_id.clone() else {
            return;
        };

        let provider = self.provider.clone();
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            let result = provider.remove_item(&story_id, &generation_id).await;
            let _ = event_tx.send(ServiceEvent::ItemRemoved {
                story_id,
                generation_id,
                result,
            });
        });
    }

    fn fetch_story(&mut self, story_id: String) {
        let seq = self.reorder.begin_refetch();
        let provider = self.provider.clone();
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            let result = provider.get_story(&story_id).await;
            let _ = event_tx.send(ServiceEvent::StoryFetched {
                story_id,
                seq,
                result,
            });
        });
    }

    /// Show `items` for the displayed story and keep the live timeline in step
    fn apply_items(&mut self, items: Vec<StoryItem>, authoritative: bool) {
        let Some(story_id) = self.displayed_story_id.clone() else {
            return;
        };

        self.items.replace(items);
        let timeline = self.items.timeline();
        debug!(
            "Showing {} story {}: {:?}",
            if authoritative { "server" } else { "optimistic" },
            story_id,
            timeline.generation_ids()
        );
        self.controller.refresh_timeline(&story_id, timeline);

        self.progress_handle.publish(StoryProgress::ItemsChanged {
            story_id,
            items: self.items.items().to_vec(),
            authoritative,
        });

        self.load_missing_clips();
    }

    fn load_missing_clips(&mut self) {
        let missing: Vec<String> = self
            .items
            .items()
            .iter()
            .map(|item| item.generation_id.clone())
            .filter(|id| !self.controller.output().has_clip(id) && !self.clips_in_flight.contains(id))
            .collect();
        if missing.is_empty() {
            return;
        }

        self.clips_in_flight.extend(missing.iter().cloned());

        let provider = self.provider.clone();
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            let mut loads = futures::stream::iter(missing)
                .map(|generation_id| {
                    let provider = provider.clone();
                    async move {
                        let result = fetch_clip(provider.as_ref(), &generation_id).await;
                        (generation_id, result)
                    }
                })
                .buffer_unordered(CLIP_FETCH_CONCURRENCY);

            while let Some((generation_id, result)) = loads.next().await {
                let _ = event_tx.send(ServiceEvent::ClipLoaded {
                    generation_id,
                    result,
                });
            }
        });
    }

    fn forward_playback_events(&mut self) {
        while let Ok(progress) = self.playback_rx.try_recv() {
            self.progress_handle
                .publish(StoryProgress::Playback(progress));
        }
    }

    fn sync_scroll(&mut self) {
        let session = self.controller.session();
        let timeline = self.items.timeline();
        let active = active_item_id(&timeline, &session, self.displayed_story_id.as_deref());

        if let Some(action) = self.scroll.update(active, session.is_playing) {
            self.progress_handle.publish(StoryProgress::ScrollTo {
                generation_id: action.generation_id,
            });
        }
    }

    fn request_failed(&self, context: &str, e: &ApiError) {
        error!("{}: {}", context, e);
        self.progress_handle.publish(StoryProgress::RequestFailed {
            message: e.user_message(),
        });
    }
}

async fn fetch_clip(
    provider: &dyn StoryDataProvider,
    generation_id: &str,
) -> Result<DecodedClip, String> {
    let bytes = provider
        .clip_audio(generation_id)
        .await
        .map_err(|e| e.user_message())?;

    tokio::task::spawn_blocking(move || decode_clip(bytes))
        .await
        .map_err(|e| format!("Decode task failed: {}", e))?
        .map_err(|e| e.to_string())
}
