use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{error, info};
use voicebox::config::Config;
use voicebox::export::{export_story_audio, ExportOutcome, RfdBridge};
use voicebox::playback::{
    list_output_devices, CpalAudioOutput, PlaybackProgress, StoryPlaybackService, StoryProgress,
};
use voicebox::story::{project, StoryDataProvider};
use voicebox::StoryClient;

#[derive(Debug, Parser)]
#[command(name = "voicebox")]
#[command(about = "Play and export voicebox stories", long_about = None)]
struct Cli {
    /// Backend URL (overrides VOICEBOX_SERVER_URL)
    #[arg(long, value_name = "URL")]
    server: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List stories
    Stories,
    /// Show a story's timeline
    Show { story_id: String },
    /// Play a story on the output device
    Play {
        story_id: String,
        /// Restart from the first item when the story ends
        #[arg(long = "loop")]
        looping: bool,
        /// Output volume from 0.0 to 1.0
        #[arg(long, default_value_t = 1.0)]
        volume: f32,
    },
    /// Export a story's mixed audio
    Export { story_id: String },
    /// List audio output devices
    Devices,
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() {
    // Use RUST_LOG env var if set, otherwise default to info level
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    let cli = Cli::parse();
    let mut config = Config::load();
    if let Some(server) = cli.server {
        config.server_url = server;
    }

    let client = StoryClient::new(&config.server_url);
    info!("Using backend {}", client.base_url());
    let result = match cli.command {
        Command::Stories => list_stories(&client).await,
        Command::Show { story_id } => show_story(&client, &story_id).await,
        Command::Play {
            story_id,
            looping,
            volume,
        } => {
            play_story(
                Arc::new(client),
                &config,
                &story_id,
                looping || config.looping,
                volume,
            )
            .await
        }
        Command::Export { story_id } => export_story(&client, &config, &story_id).await,
        Command::Devices => list_devices(),
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn list_stories(client: &StoryClient) -> CliResult {
    let stories = client.list_stories().await?;
    if stories.is_empty() {
        println!("No stories");
    }
    for story in stories {
        println!("{}  {} ({} items)", story.id, story.name, story.item_count);
    }
    Ok(())
}

async fn show_story(client: &StoryClient, story_id: &str) -> CliResult {
    let story = client.get_story(story_id).await?;
    let timeline = project(&story.items);

    println!("{} ({:.1}s)", story.name, timeline.total_duration_ms / 1000.0);
    for item in &timeline.sorted_items {
        println!(
            "  {:>8.1}s  {:>6.2}s  {}  {}",
            item.start_ms() / 1000.0,
            item.duration,
            item.generation_id,
            item.text.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

async fn play_story(
    client: Arc<StoryClient>,
    config: &Config,
    story_id: &str,
    looping: bool,
    volume: f32,
) -> CliResult {
    let device = config.output_device.clone();
    let handle = StoryPlaybackService::<CpalAudioOutput>::start_with_output(
        client,
        move || {
            let output = CpalAudioOutput::open(device.as_deref())?;
            output.set_volume(volume);
            Ok(output)
        },
        config.tick_interval,
        looping,
    );
    let mut progress = handle.subscribe_progress();
    handle.open_story(story_id);

    let mut started = false;
    loop {
        tokio::select! {
            event = progress.recv() => {
                let Some(event) = event else {
                    return Err("playback service stopped".into());
                };
                match event {
                    StoryProgress::ItemsChanged { authoritative: true, .. } if !started => {
                        started = true;
                        handle.play();
                    }
                    StoryProgress::ScrollTo { generation_id } => println!("> {}", generation_id),
                    StoryProgress::RequestFailed { message } if !started => {
                        return Err(message.into());
                    }
                    StoryProgress::RequestFailed { message } => error!("{}", message),
                    StoryProgress::Playback(PlaybackProgress::Finished { .. }) => {
                        info!("Story finished");
                        return Ok(());
                    }
                    _ => {}
                }
            }
            _ = tokio::signal::ctrl_c() => {
                handle.stop();
                return Ok(());
            }
        }
    }
}

async fn export_story(client: &StoryClient, config: &Config, story_id: &str) -> CliResult {
    let story = client.get_story(story_id).await?;
    let outcome = export_story_audio(
        client,
        &RfdBridge,
        story_id,
        &story.name,
        &config.export_dir,
    )
    .await?;

    match outcome {
        ExportOutcome::Saved(path) | ExportOutcome::Downloaded(path) => {
            println!("Exported to {}", path.display())
        }
        ExportOutcome::Cancelled => println!("Export cancelled"),
    }
    Ok(())
}

fn list_devices() -> CliResult {
    for device in list_output_devices()? {
        let marker = if device.is_default { " (default)" } else { "" };
        println!("{}  {}{}", device.id, device.name, marker);
    }
    Ok(())
}
