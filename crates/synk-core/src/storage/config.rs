//! TOML-based application configuration.
//!
//! Stores:
//! - Scheduler timings (debounce window, poll interval, backoff bounds)
//! - The sync window around "now"
//! - Notion property names and API endpoints
//! - The default log filter
//!
//! Configuration is stored at `~/.config/synk/config.toml`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::error::ConfigError;
use crate::integrations::google::CALENDAR_API_BASE;
use crate::integrations::notion::{NOTION_API_BASE, NOTION_VERSION};
use crate::integrations::oauth::GOOGLE_TOKEN_URL;
use crate::sync::mapper::{PropertyNames, DESCRIPTION_PROPERTY, LINK_PROPERTY};

/// Upper bounds for the timing fields. Larger values overflow clock
/// arithmetic somewhere in a pass.
const MAX_WINDOW_DAYS: i64 = 3650;
const MAX_POLL_INTERVAL_SECS: u64 = 24 * 60 * 60;
const MAX_DEBOUNCE_MS: u64 = 10 * 60 * 1000;
const MAX_BACKOFF_CAP_MS: u64 = 24 * 60 * 60 * 1000;
const MAX_REQUEST_TIMEOUT_SECS: u64 = 60 * 60;

/// Scheduler and reconciler timings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_window_days")]
    pub window_days: i64,
    #[serde(default = "default_backoff_floor_ms")]
    pub backoff_floor_ms: u64,
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Notion configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotionConfig {
    #[serde(default = "default_notion_api_base")]
    pub api_base: String,
    #[serde(default = "default_notion_version")]
    pub version: String,
    /// Date property to sync; the first date property when unset.
    #[serde(default)]
    pub date_property: Option<String>,
    #[serde(default = "default_description_property")]
    pub description_property: String,
    #[serde(default = "default_link_property")]
    pub link_property: String,
}

/// Google configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoogleConfig {
    #[serde(default = "default_calendar_api_base")]
    pub api_base: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/synk/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub notion: NotionConfig,
    #[serde(default)]
    pub google: GoogleConfig,
    #[serde(default)]
    pub log: LogConfig,
}

// Default functions
fn default_debounce_ms() -> u64 {
    1200
}
fn default_poll_interval_secs() -> u64 {
    60
}
fn default_window_days() -> i64 {
    30
}
fn default_backoff_floor_ms() -> u64 {
    1000
}
fn default_backoff_cap_ms() -> u64 {
    60_000
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_notion_api_base() -> String {
    NOTION_API_BASE.into()
}
fn default_notion_version() -> String {
    NOTION_VERSION.into()
}
fn default_description_property() -> String {
    DESCRIPTION_PROPERTY.into()
}
fn default_link_property() -> String {
    LINK_PROPERTY.into()
}
fn default_calendar_api_base() -> String {
    CALENDAR_API_BASE.into()
}
fn default_token_url() -> String {
    GOOGLE_TOKEN_URL.into()
}
fn default_log_filter() -> String {
    "info".into()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            poll_interval_secs: default_poll_interval_secs(),
            window_days: default_window_days(),
            backoff_floor_ms: default_backoff_floor_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for NotionConfig {
    fn default() -> Self {
        Self {
            api_base: default_notion_api_base(),
            version: default_notion_version(),
            date_property: None,
            description_property: default_description_property(),
            link_property: default_link_property(),
        }
    }
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            api_base: default_calendar_api_base(),
            token_url: default_token_url(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

impl SyncConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl NotionConfig {
    pub fn property_names(&self) -> PropertyNames {
        PropertyNames {
            date: self.date_property.clone().filter(|d| !d.is_empty()),
            description: self.description_property.clone(),
            link: self.link_property.clone(),
        }
    }
}

impl Config {
    /// Default config file location.
    pub fn path() -> Result<PathBuf, ConfigError> {
        data_dir()
            .map(|dir| dir.join("config.toml"))
            .map_err(|e| ConfigError::LoadFailed {
                path: PathBuf::from("config.toml"),
                message: e.to_string(),
            })
    }

    /// Load from the default location, falling back to defaults when the
    /// file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let load_failed = |message: String| ConfigError::LoadFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = std::fs::read_to_string(path).map_err(|e| load_failed(e.to_string()))?;
        let config: Self = toml::from_str(&content).map_err(|e| load_failed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, message: &str| ConfigError::InvalidValue {
            key: key.to_string(),
            message: message.to_string(),
        };

        let sync = &self.sync;
        if !(1..=MAX_WINDOW_DAYS).contains(&sync.window_days) {
            return Err(invalid(
                "sync.window_days",
                &format!("must be between 1 and {MAX_WINDOW_DAYS}"),
            ));
        }
        for (key, value, max) in [
            ("sync.poll_interval_secs", sync.poll_interval_secs, MAX_POLL_INTERVAL_SECS),
            ("sync.backoff_cap_ms", sync.backoff_cap_ms, MAX_BACKOFF_CAP_MS),
            ("sync.request_timeout_secs", sync.request_timeout_secs, MAX_REQUEST_TIMEOUT_SECS),
        ] {
            if !(1..=max).contains(&value) {
                return Err(invalid(key, &format!("must be between 1 and {max}")));
            }
        }
        if sync.debounce_ms > MAX_DEBOUNCE_MS {
            return Err(invalid(
                "sync.debounce_ms",
                &format!("must not exceed {MAX_DEBOUNCE_MS}"),
            ));
        }
        if sync.backoff_floor_ms == 0 || sync.backoff_floor_ms > sync.backoff_cap_ms {
            return Err(invalid(
                "sync.backoff_floor_ms",
                "must be positive and not exceed sync.backoff_cap_ms",
            ));
        }
        for (key, value) in [
            ("notion.api_base", &self.notion.api_base),
            ("google.api_base", &self.google.api_base),
            ("google.token_url", &self.google.token_url),
        ] {
            url::Url::parse(value).map_err(|e| invalid(key, &e.to_string()))?;
        }
        Ok(())
    }
}
