use crate::render::OutputFormat;
use crate::utils::get_data_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration, stored as `config.json` in the data directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Chain flattened when `--chain` is not given
    #[serde(default = "default_chain")]
    pub default_chain: String,
    /// Output format when `--format` is not given
    #[serde(default)]
    pub default_format: OutputFormat,
    /// Fail instead of warning when a jump branch cannot be resolved
    #[serde(default)]
    pub strict: bool,
    /// `tracing` filter used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Write logs to the state directory instead of stderr
    #[serde(default)]
    pub log_to_file: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_chain: default_chain(),
            default_format: OutputFormat::default(),
            strict: false,
            log_level: default_log_level(),
            log_to_file: false,
        }
    }
}

fn default_chain() -> String {
    "INPUT".to_string()
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn config_path() -> Option<PathBuf> {
    get_data_dir().map(|mut path| {
        path.push("config.json");
        path
    })
}

/// Writes `config` to `path` using an atomic write pattern.
/// 1. Writes to a temporary file created with mode 0o600.
/// 2. Atomically renames to the target path.
pub async fn save_config_to(path: &Path, config: &AppConfig) -> std::io::Result<()> {
    let json = serde_json::to_string_pretty(config)?;
    let temp_path = path.with_extension("json.tmp");

    #[cfg(unix)]
    {
        use tokio::fs::OpenOptions;
        use tokio::io::AsyncWriteExt;

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .mode(0o600) // Set permissions BEFORE any data is written
            .open(&temp_path)
            .await?;

        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;
    }

    #[cfg(not(unix))]
    {
        tokio::fs::write(&temp_path, json).await?;
    }

    tokio::fs::rename(temp_path, path).await
}

/// Saves the config to the data directory.
pub async fn save_config(config: &AppConfig) -> std::io::Result<()> {
    if let Some(path) = config_path() {
        save_config_to(&path, config).await?;
    }
    Ok(())
}

/// Loads the config from `path`, or returns default if missing or invalid.
pub async fn load_config_from(path: &Path) -> AppConfig {
    match tokio::fs::read_to_string(path).await {
        Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
            tracing::warn!("Ignoring invalid config {}: {}", path.display(), e);
            AppConfig::default()
        }),
        Err(_) => AppConfig::default(),
    }
}

/// Loads the config from the data directory, or returns default.
pub async fn load_config() -> AppConfig {
    match config_path() {
        Some(path) => load_config_from(&path).await,
        None => AppConfig::default(),
    }
}
