//! Application configuration
//!
//! Resolved from, lowest to highest precedence:
//! 1. Default values
//! 2. Config file (`<config_dir>/sync-todo/config.toml` or `SYNC_TODO_CONFIG`)
//! 3. Environment variables (`SYNC_TODO_*`)
//! 4. Command-line flags (applied in `main`)

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const ENV_PREFIX: &str = "SYNC_TODO";
const APP_DIR: &str = "sync-todo";

/// Where the per-user collections are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory for the session file, log file and default database
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub backend: Backend,

    /// SQLite file; defaults to `<data_dir>/todos.sqlite`
    #[serde(default)]
    pub db_path: Option<PathBuf>,

    /// Render/poll interval in milliseconds
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log file; defaults to `<data_dir>/sync-todo.log`
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Show listener errors as a stale marker instead of dropping them
    #[serde(default)]
    pub surface_sync_errors: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            backend: Backend::default(),
            db_path: None,
            tick_ms: default_tick_ms(),
            log_level: default_log_level(),
            log_file: None,
            surface_sync_errors: false,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Missing files fall back to defaults. Environment overrides still apply.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            Self::parse(&content)
                .with_context(|| format!("failed to parse config file {}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn parse(toml_content: &str) -> Result<Self> {
        toml::from_str(toml_content).context("invalid config TOML")
    }

    /// Apply `SYNC_TODO_*` overrides looked up through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}_{name}"));

        if let Some(val) = var("DATA_DIR") {
            self.data_dir = PathBuf::from(val);
        }
        if let Some(val) = var("BACKEND") {
            match val.to_ascii_lowercase().as_str() {
                "sqlite" => self.backend = Backend::Sqlite,
                "memory" => self.backend = Backend::Memory,
                _ => {}
            }
        }
        if let Some(val) = var("DB_PATH") {
            self.db_path = if val.is_empty() { None } else { Some(PathBuf::from(val)) };
        }
        if let Some(ms) = var("TICK_MS").and_then(|v| v.parse().ok()) {
            self.tick_ms = ms;
        }
        if let Some(val) = var("LOG") {
            self.log_level = val;
        }
        if let Some(val) = var("SURFACE_SYNC_ERRORS") {
            self.surface_sync_errors = val.eq_ignore_ascii_case("true") || val == "1";
        }
    }

    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{ENV_PREFIX}_CONFIG")) {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.toml")
    }

    pub fn sqlite_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("todos.sqlite"))
    }

    pub fn log_path(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join("sync-todo.log"))
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

fn default_tick_ms() -> u64 {
    120
}

fn default_log_level() -> String {
    "info".to_string()
}
