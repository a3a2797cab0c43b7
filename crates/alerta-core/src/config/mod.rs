//! Client configuration.
//!
//! Values come from an optional `config.json` in the platform config
//! directory, then `ALERTA_*` environment variables. Nothing here is secret.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::util::{is_http_url, normalize_text_option};
use crate::{Error, Result};

/// Directory name used under the platform config and data directories
pub const APP_DIR_NAME: &str = "alerta360";
const CONFIG_FILE_NAME: &str = "config.json";
const DB_FILE_NAME: &str = "alerta.db";

const DEFAULT_SYNC_INTERVAL_HOURS: u64 = 1;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 15;
const DEFAULT_PROBE_INTERVAL_SECS: u64 = 30;

pub const ENV_API_BASE_URL: &str = "ALERTA_API_BASE_URL";
pub const ENV_DB_PATH: &str = "ALERTA_DB_PATH";
pub const ENV_USER_ID: &str = "ALERTA_USER_ID";
pub const ENV_SYNC_INTERVAL_HOURS: &str = "ALERTA_SYNC_INTERVAL_HOURS";
pub const ENV_HTTP_TIMEOUT_SECS: &str = "ALERTA_HTTP_TIMEOUT_SECS";
pub const ENV_PROBE_INTERVAL_SECS: &str = "ALERTA_PROBE_INTERVAL_SECS";

/// Settings shared by Alerta360 clients.
///
/// Every field is optional; accessors fill in defaults. Without an API base
/// URL the client works offline and incidents stay queued.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    #[serde(default)]
    pub api_base_url: Option<String>,
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    #[serde(default)]
    pub author_id: Option<String>,
    #[serde(default)]
    pub sync_interval_hours: Option<u64>,
    #[serde(default)]
    pub http_timeout_secs: Option<u64>,
    #[serde(default)]
    pub probe_interval_secs: Option<u64>,
}

impl ClientConfig {
    /// Load from the default config file and the process environment.
    pub fn load() -> Result<Self> {
        let config = match Self::default_path() {
            Some(path) => Self::load_from_path(&path)?,
            None => Self::default(),
        };
        config.with_env_overrides(|key| std::env::var(key).ok())
    }

    /// `<config dir>/alerta360/config.json`, when the platform has a config dir
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Read a config file. A missing file yields the default config.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config file at {}", path.display());
            return Ok(Self::default());
        }

        let payload = std::fs::read_to_string(path)?;
        Self::parse(&payload)
            .map_err(|error| Error::Config(format!("{}: {error}", path.display())))
    }

    /// Parse and validate a JSON config payload.
    pub fn parse(payload: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(payload)
            .map_err(|error| Error::Config(format!("invalid config JSON: {error}")))?;
        config.normalized()
    }

    /// Apply `ALERTA_*` overrides read through `lookup`, then validate.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str| normalize_text_option(lookup(key));

        if let Some(url) = text(ENV_API_BASE_URL) {
            self.api_base_url = Some(url);
        }
        if let Some(path) = text(ENV_DB_PATH) {
            self.db_path = Some(PathBuf::from(path));
        }
        if let Some(author) = text(ENV_USER_ID) {
            self.author_id = Some(author);
        }
        if let Some(value) = text(ENV_SYNC_INTERVAL_HOURS) {
            self.sync_interval_hours = Some(parse_number(ENV_SYNC_INTERVAL_HOURS, &value)?);
        }
        if let Some(value) = text(ENV_HTTP_TIMEOUT_SECS) {
            self.http_timeout_secs = Some(parse_number(ENV_HTTP_TIMEOUT_SECS, &value)?);
        }
        if let Some(value) = text(ENV_PROBE_INTERVAL_SECS) {
            self.probe_interval_secs = Some(parse_number(ENV_PROBE_INTERVAL_SECS, &value)?);
        }

        self.normalized()
    }

    /// Trim text fields and reject values the client cannot use.
    pub fn normalized(mut self) -> Result<Self> {
        self.api_base_url = match normalize_text_option(self.api_base_url) {
            Some(url) if is_http_url(&url) => Some(url.trim_end_matches('/').to_string()),
            Some(url) => {
                return Err(Error::Config(format!(
                    "api_base_url must include http:// or https:// (got '{url}')"
                )))
            }
            None => None,
        };
        self.author_id = normalize_text_option(self.author_id);
        self.db_path = self
            .db_path
            .filter(|path| !path.as_os_str().is_empty());

        for (field, value) in [
            ("sync_interval_hours", self.sync_interval_hours),
            ("http_timeout_secs", self.http_timeout_secs),
            ("probe_interval_secs", self.probe_interval_secs),
        ] {
            if value == Some(0) {
                return Err(Error::Config(format!("{field} must be greater than zero")));
            }
        }

        Ok(self)
    }

    pub fn api_base_url(&self) -> Option<&str> {
        self.api_base_url.as_deref()
    }

    pub fn author_id(&self) -> Option<&str> {
        self.author_id.as_deref()
    }

    /// Configured database file, or `<data dir>/alerta360/alerta.db`
    pub fn db_path(&self) -> PathBuf {
        self.db_path.clone().unwrap_or_else(default_db_path)
    }

    pub fn sync_interval(&self) -> Duration {
        hours(self.sync_interval_hours.unwrap_or(DEFAULT_SYNC_INTERVAL_HOURS))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs.unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS))
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(
            self.probe_interval_secs
                .unwrap_or(DEFAULT_PROBE_INTERVAL_SECS),
        )
    }
}

/// Convert whole hours to a duration
pub const fn hours(hours: u64) -> Duration {
    Duration::from_secs(hours.saturating_mul(60 * 60))
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
        .join(DB_FILE_NAME)
}

fn parse_number(key: &str, value: &str) -> Result<u64> {
    value
        .parse()
        .map_err(|_| Error::Config(format!("{key} must be a whole number (got '{value}')")))
}
