//! Session configuration management.
//!
//! This module handles loading and saving the session configuration, which
//! includes the backend API location, token lifetimes and where persisted
//! session state lives.
//!
//! Configuration is stored at `~/.config/tokenkeep/config.json`. The
//! `TOKENKEEP_API_URL` and `TOKENKEEP_STATE_DIR` environment variables
//! (optionally from a `.env` file) override the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Application name used for config/state directory paths
const APP_NAME: &str = "tokenkeep";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const ENV_API_URL: &str = "TOKENKEEP_API_URL";
const ENV_STATE_DIR: &str = "TOKENKEEP_STATE_DIR";

const DEFAULT_API_URL: &str = "http://localhost:8000/api";

/// Access tokens issued by the backend live for one hour.
const DEFAULT_ACCESS_TOKEN_LIFETIME_SECS: u64 = 60 * 60;

/// Renew with five minutes of validity remaining.
const DEFAULT_REFRESH_MARGIN_SECS: u64 = 5 * 60;

/// "Remember me" cookies expire after a week.
const DEFAULT_REMEMBER_DAYS: i64 = 7;

const DEFAULT_BROADCAST_RETRACT_MS: u64 = 100;

const DEFAULT_LOGIN_PATH: &str = "/admin/login";

/// HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub api_url: String,
    pub access_token_lifetime_secs: u64,
    pub refresh_margin_secs: u64,
    pub remember_days: i64,
    pub broadcast_retract_ms: u64,
    pub login_path: String,
    pub request_timeout_secs: u64,
    pub state_dir: Option<PathBuf>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            access_token_lifetime_secs: DEFAULT_ACCESS_TOKEN_LIFETIME_SECS,
            refresh_margin_secs: DEFAULT_REFRESH_MARGIN_SECS,
            remember_days: DEFAULT_REMEMBER_DAYS,
            broadcast_retract_ms: DEFAULT_BROADCAST_RETRACT_MS,
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            state_dir: None,
        }
    }
}

impl AuthConfig {
    /// Load the config file (if any) and apply environment overrides.
    pub fn load() -> Result<Self> {
        // Load .env file if present (silently ignore if not found)
        let _ = dotenvy::dotenv();

        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env();
        Ok(config)
    }

    /// Load from an explicit path without environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            let config = serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?;
            debug!(path = %path.display(), "Config loaded");
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(ENV_API_URL) {
            if !url.is_empty() {
                self.api_url = url;
            }
        }
        if let Ok(dir) = std::env::var(ENV_STATE_DIR) {
            if !dir.is_empty() {
                self.state_dir = Some(PathBuf::from(dir));
            }
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the persisted cookie jar and shared storage.
    pub fn state_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.state_dir {
            return Ok(dir.clone());
        }
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    /// How long after a login or refresh the scheduler should fire.
    pub fn refresh_delay(&self) -> Duration {
        Duration::from_secs(
            self.access_token_lifetime_secs
                .saturating_sub(self.refresh_margin_secs),
        )
    }

    pub fn broadcast_retract_delay(&self) -> Duration {
        Duration::from_millis(self.broadcast_retract_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
