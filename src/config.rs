use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_TICK_MS: u64 = 16;

/// Application configuration
/// In debug builds: also loads a .env file before reading the environment
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Base URL of the voicebox backend
    pub server_url: String,
    /// Playback tick period (one display frame by default)
    pub tick_interval: Duration,
    /// Whether story playback starts with looping enabled
    pub looping: bool,
    /// Where exports land when the native save dialog is unavailable
    pub export_dir: PathBuf,
    /// Output device id as reported by `devices`; default device when unset
    pub output_device: Option<String>,
}

impl Config {
    /// Load configuration based on build mode
    pub fn load() -> Self {
        #[cfg(debug_assertions)]
        {
            if dotenvy::dotenv().is_ok() {
                tracing::info!("Config: Dev mode activated - loaded .env file");
            } else {
                debug!("Config: No .env file found");
            }
        }

        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build from a variable lookup
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let server_url = var("VOICEBOX_SERVER_URL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());

        let tick_ms = match var("VOICEBOX_TICK_MS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => ms,
                _ => {
                    warn!("Config: Invalid VOICEBOX_TICK_MS {:?}, using {}", raw, DEFAULT_TICK_MS);
                    DEFAULT_TICK_MS
                }
            },
            None => DEFAULT_TICK_MS,
        };

        let looping = var("VOICEBOX_LOOP")
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or(false);

        let export_dir = var("VOICEBOX_EXPORT_DIR")
            .map(PathBuf::from)
            .or_else(dirs::download_dir)
            .unwrap_or_else(|| PathBuf::from("."));

        let output_device = var("VOICEBOX_OUTPUT_DEVICE").filter(|v| !v.is_empty());

        debug!("Config: server {}, tick {}ms", server_url, tick_ms);

        Self {
            server_url,
            tick_interval: Duration::from_millis(tick_ms),
            looping,
            export_dir,
            output_device,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_vars(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.server_url, DEFAULT_SERVER_URL);
        assert_eq!(config.tick_interval, Duration::from_millis(16));
        assert!(!config.looping);
        assert_eq!(config.output_device, None);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("VOICEBOX_SERVER_URL", "http://studio:9000"),
            ("VOICEBOX_TICK_MS", "33"),
            ("VOICEBOX_LOOP", "TRUE"),
            ("VOICEBOX_EXPORT_DIR", "/tmp/exports"),
        ]);
        assert_eq!(config.server_url, "http://studio:9000");
        assert_eq!(config.tick_interval, Duration::from_millis(33));
        assert!(config.looping);
        assert_eq!(config.export_dir, PathBuf::from("/tmp/exports"));
    }

    #[test]
    fn test_bad_tick_falls_back() {
        assert_eq!(
            config_from(&[("VOICEBOX_TICK_MS", "0")]).tick_interval,
            Duration::from_millis(DEFAULT_TICK_MS)
        );
        assert_eq!(
            config_from(&[("VOICEBOX_TICK_MS", "fast")]).tick_interval,
            Duration::from_millis(DEFAULT_TICK_MS)
        );
    }
}
