use crate::api::ApiError;
use crate::story::provider::StoryDataProvider;
use rfd::AsyncFileDialog;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info, warn};

// Name length limit, in UTF-16 code units
const MAX_NAME_UNITS: usize = 50;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Export request failed: {0}")]
    Api(#[from] ApiError),
    #[error("Save dialog failed: {0}")]
    Dialog(String),
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Where an export ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    /// Written to the path the user picked in the native dialog
    Saved(PathBuf),
    /// User dismissed the dialog; nothing was written
    Cancelled,
    /// Written to the download directory
    Downloaded(PathBuf),
}

/// Host file-system services of the desktop shell
#[async_trait::async_trait]
pub trait NativeShellBridge: Send + Sync {
    fn is_available(&self) -> bool;
    /// `Ok(None)` when the user cancels
    async fn save_dialog(&self, default_name: &str) -> Result<Option<PathBuf>, ExportError>;
    async fn write_binary(&self, path: &Path, bytes: &[u8]) -> Result<(), ExportError>;
}

/// Native save dialog through rfd
#[derive(Debug, Default, Clone, Copy)]
pub struct RfdBridge;

#[async_trait::async_trait]
impl NativeShellBridge for RfdBridge {
    fn is_available(&self) -> bool {
        if cfg!(any(target_os = "macos", target_os = "windows")) {
            return true;
        }
        std::env::var_os("DISPLAY").is_some() || std::env::var_os("WAYLAND_DISPLAY").is_some()
    }

    async fn save_dialog(&self, default_name: &str) -> Result<Option<PathBuf>, ExportError> {
        let handle = AsyncFileDialog::new()
            .set_title("Export Story Audio")
            .set_file_name(default_name)
            .add_filter("Audio File", &["wav"])
            .save_file()
            .await;
        Ok(handle.map(|h| h.path().to_path_buf()))
    }

    async fn write_binary(&self, path: &Path, bytes: &[u8]) -> Result<(), ExportError> {
        tokio::fs::write(path, bytes)
            .await
            .map_err(|source| ExportError::Write {
                path: path.to_path_buf(),
                source,
            })
    }
}

/// File name for an exported story: `my-story.wav`
///
/// Every UTF-16 code unit outside `[a-z0-9]` becomes `-`, so a character outside the
/// BMP yields two dashes, or one when the length limit cuts it in half.
pub fn export_filename(story_name: &str) -> String {
    let mut safe = String::new();
    let mut units = 0;
    for c in story_name.chars() {
        if units >= MAX_NAME_UNITS {
            break;
        }
        let width = c.len_utf16();
        if c.is_ascii_alphanumeric() {
            safe.push(c.to_ascii_lowercase());
        } else {
            safe.extend(std::iter::repeat('-').take(width.min(MAX_NAME_UNITS - units)));
        }
        units += width;
    }

    if safe.is_empty() {
        "story.wav".to_string()
    } else {
        format!("{}.wav", safe)
    }
}

/// Fetch the mixed story audio and save it
///
/// With a native shell the user picks the destination; a failing dialog or write falls
/// back to the download directory, a cancelled dialog writes nothing.
pub async fn export_story_audio(
    provider: &dyn StoryDataProvider,
    bridge: &dyn NativeShellBridge,
    story_id: &str,
    story_name: &str,
    download_dir: &Path,
) -> Result<ExportOutcome, ExportError> {
    let bytes = provider.export_audio(story_id).await?;
    let filename = export_filename(story_name);
    info!("Exporting story {} ({} bytes) as {}", story_id, bytes.len(), filename);

    if bridge.is_available() {
        match save_with_dialog(bridge, &filename, &bytes).await {
            Ok(outcome) => return Ok(outcome),
            Err(e) => {
                error!("Failed to use native save dialog, falling back to download: {}", e);
            }
        }
    }

    let path = download_to(download_dir, &filename, &bytes).await?;
    Ok(ExportOutcome::Downloaded(path))
}

async fn save_with_dialog(
    bridge: &dyn NativeShellBridge,
    filename: &str,
    bytes: &[u8],
) -> Result<ExportOutcome, ExportError> {
    let Some(path) = bridge.save_dialog(filename).await? else {
        return Ok(ExportOutcome::Cancelled);
    };
    bridge.write_binary(&path, bytes).await?;
    info!("Saved export to {}", path.display());
    Ok(ExportOutcome::Saved(path))
}

/// Write into `dir` without clobbering: `name.wav`, `name (1).wav`, ...
async fn download_to(dir: &Path, filename: &str, bytes: &[u8]) -> Result<PathBuf, ExportError> {
    let write_err = |path: &Path, source| ExportError::Write {
        path: path.to_path_buf(),
        source,
    };

    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| write_err(dir, e))?;

    let (stem, ext) = filename.rsplit_once('.').unwrap_or((filename, "wav"));
    let mut path = dir.join(filename);
    let mut n = 1;
    while tokio::fs::try_exists(&path).await.unwrap_or(false) {
        path = dir.join(format!("{} ({}).{}", stem, n, ext));
        n += 1;
    }

    if let Err(e) = tokio::fs::write(&path, bytes).await {
        warn!("Download fallback failed for {}", path.display());
        return Err(write_err(&path, e));
    }
    info!("Downloaded export to {}", path.display());
    Ok(path)
}
