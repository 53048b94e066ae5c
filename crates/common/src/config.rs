//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory holding the frame blob store.
    pub store_dir: PathBuf,

    /// Directory where background-sync payloads are dropped.
    pub outbox_dir: PathBuf,

    /// Event key required by the background upload channel.
    #[serde(default)]
    pub event_key: Option<String>,

    /// Export pipeline settings.
    #[serde(default)]
    pub export: ExportDefaults,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Export pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportDefaults {
    /// Encoder executable name or path.
    pub ffmpeg_binary: String,

    /// Abort the encoder after this many seconds (none = wait forever).
    pub encode_timeout_secs: Option<u64>,

    /// Buffered encode-progress updates before the encoder waits.
    pub progress_channel_capacity: usize,

    /// Parent of the per-export frame staging dirs (none = system temp dir).
    pub staging_dir: Option<PathBuf>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "flipbook=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let data = data_dir();
        Self {
            store_dir: data.join("frames"),
            outbox_dir: data.join("outbox"),
            event_key: None,
            export: ExportDefaults::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ExportDefaults {
    fn default() -> Self {
        Self {
            ffmpeg_binary: "ffmpeg".to_string(),
            encode_timeout_secs: None,
            progress_channel_capacity: 64,
            staging_dir: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl ExportDefaults {
    pub fn encode_timeout(&self) -> Option<Duration> {
        self.encode_timeout_secs.map(Duration::from_secs)
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }
}

/// Standard config file location.
fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("flipbook").join("config.json")
}

/// Default data directory.
fn data_dir() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local").join("share")
        });
    base.join("flipbook")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let json = r#"{"store_dir":"/tmp/frames","outbox_dir":"/tmp/outbox"}"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.store_dir, PathBuf::from("/tmp/frames"));
        assert!(config.event_key.is_none());
        assert_eq!(config.export.ffmpeg_binary, "ffmpeg");
        assert_eq!(config.export.progress_channel_capacity, 64);
        assert!(config.export.staging_dir.is_none());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_encode_timeout_conversion() {
        let mut defaults = ExportDefaults::default();
        assert!(defaults.encode_timeout().is_none());
        defaults.encode_timeout_secs = Some(90);
        assert_eq!(defaults.encode_timeout(), Some(Duration::from_secs(90)));
    }
}
