use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_PATH_ENV: &str = "SHOPFLOW_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "shopflow.yaml";

const DEFAULT_REPLY_API_BASE: &str = "https://api.line.me";
const DEFAULT_FALLBACK_API_BASE: &str = "https://api.openai.com";
const DEFAULT_FALLBACK_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// File-backed settings. Secrets (channel access token, generator API key)
/// never live here; they come from the environment at client construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settings {
    pub catalog_url: String,
    pub ledger_db_path: PathBuf,
    #[serde(default = "default_state_root")]
    pub state_root: PathBuf,
    #[serde(default = "default_reply_api_base")]
    pub reply_api_base: String,
    #[serde(default)]
    pub fallback: FallbackSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FallbackSettings {
    #[serde(default = "default_fallback_api_base")]
    pub api_base: String,
    #[serde(default = "default_fallback_model")]
    pub model: String,
}

impl Default for FallbackSettings {
    fn default() -> Self {
        Self {
            api_base: default_fallback_api_base(),
            model: default_fallback_model(),
        }
    }
}

fn default_state_root() -> PathBuf {
    PathBuf::from("state")
}

fn default_reply_api_base() -> String {
    DEFAULT_REPLY_API_BASE.to_string()
}

fn default_fallback_api_base() -> String {
    DEFAULT_FALLBACK_API_BASE.to_string()
}

fn default_fallback_model() -> String {
    DEFAULT_FALLBACK_MODEL.to_string()
}

impl Settings {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let settings: Settings =
            serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.catalog_url.trim().is_empty() {
            return Err(ConfigError::Invalid("catalog_url must be set".to_string()));
        }
        if self.ledger_db_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "ledger_db_path must be set".to_string(),
            ));
        }
        if self.fallback.model.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "fallback.model must be set".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn default_config_path() -> PathBuf {
    std::env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

pub fn load_settings() -> Result<Settings, ConfigError> {
    Settings::from_path(&default_config_path())
}
