//! Configuration loader and validator for the studyhub backend.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub app: App,
    pub notion: Notion,
    pub gemini: Gemini,
    pub sync: SyncSettings,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    pub bind: String,
}

/// Notion API settings: integration token, API version and the database
/// that gets mirrored into the local store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notion {
    pub token: String,
    pub version: String,
    pub database_id: String,
}

/// Gemini text-generation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Gemini {
    pub api_key: String,
    pub model: String,
}

/// Sync engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncSettings {
    /// Page size hint sent to the remote source (Notion caps this at 100).
    pub page_size: u32,
    /// Rows per destination write batch.
    pub batch_size: usize,
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    /// SQLite URL for the local store, honoring a `DATABASE_URL` override.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| format!("sqlite://{}/studyhub.db", self.app.data_dir))
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.bind.trim().is_empty() {
        return Err(ConfigError::Invalid("app.bind must be non-empty"));
    }

    if cfg.notion.token.trim().is_empty() {
        return Err(ConfigError::Invalid("notion.token must be non-empty"));
    }
    if cfg.notion.version.trim().is_empty() {
        return Err(ConfigError::Invalid("notion.version must be non-empty"));
    }
    if cfg.notion.database_id.trim().is_empty() {
        return Err(ConfigError::Invalid("notion.database_id must be non-empty"));
    }

    if cfg.gemini.api_key.trim().is_empty() {
        return Err(ConfigError::Invalid("gemini.api_key must be non-empty"));
    }
    if cfg.gemini.model.trim().is_empty() {
        return Err(ConfigError::Invalid("gemini.model must be non-empty"));
    }

    if cfg.sync.page_size == 0 || cfg.sync.page_size > 100 {
        return Err(ConfigError::Invalid("sync.page_size must be in 1..=100"));
    }
    if cfg.sync.batch_size == 0 {
        return Err(ConfigError::Invalid("sync.batch_size must be > 0"));
    }

    Ok(())
}

/// Returns the canonical example YAML content.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  bind: "127.0.0.1:8000"

notion:
  token: "YOUR_NOTION_INTEGRATION_TOKEN"
  version: "2022-06-28"
  database_id: "NOTION_DATABASE_ID"

gemini:
  api_key: "YOUR_GEMINI_API_KEY"
  model: "gemini-2.0-flash"

sync:
  page_size: 100
  batch_size: 25
"#
}
