use crate::error::{Result, StatisticalError};
use log::debug;
use serde::{Deserialize, Serialize};
use std::{env, path::Path};

/// Default Sentinel Hub deployment.
pub const DEFAULT_BASE_URL: &str = "https://services.sentinel-hub.com";

/// Default OAuth2 token endpoint.
pub const DEFAULT_TOKEN_URL: &str =
    "https://services.sentinel-hub.com/auth/realms/main/protocol/openid-connect/token";

/// Credentials and transport settings for Sentinel Hub requests.
///
/// Values come from a JSON file, environment variables (`SH_CLIENT_ID`,
/// `SH_CLIENT_SECRET`, `SH_BASE_URL`, `SH_TOKEN_URL`,
/// `SH_MAX_DOWNLOAD_ATTEMPTS`, `SH_DOWNLOAD_SLEEP_TIME`,
/// `SH_DOWNLOAD_TIMEOUT_SECONDS`, `SH_N_INTERVAL_RETRIES`) or both, with the
/// environment taking precedence.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShConfig {
    pub sh_client_id: String,
    pub sh_client_secret: String,
    pub sh_base_url: String,
    pub sh_token_url: String,
    pub max_download_attempts: u32,
    /// Initial backoff between attempts, in seconds; doubles after each failure
    pub download_sleep_time: f64,
    pub download_timeout_seconds: u64,
    /// Rounds of re-requesting intervals the service failed to compute
    pub n_interval_retries: u32,
}

impl Default for ShConfig {
    fn default() -> Self {
        ShConfig {
            sh_client_id: String::new(),
            sh_client_secret: String::new(),
            sh_base_url: DEFAULT_BASE_URL.to_string(),
            sh_token_url: DEFAULT_TOKEN_URL.to_string(),
            max_download_attempts: 4,
            download_sleep_time: 5.0,
            download_timeout_seconds: 120,
            n_interval_retries: 1,
        }
    }
}

fn parsed<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| StatisticalError::InvalidInput(format!("{} has an invalid value '{}'", key, value))),
        None => Ok(None),
    }
}

impl ShConfig {
    /// Defaults overridden by `SH_*` environment variables.
    pub fn from_env() -> Result<ShConfig> {
        ShConfig::default().with_env_overrides()
    }

    /// Read a JSON config file, then apply `SH_*` environment overrides.
    pub fn load(path: &Path) -> Result<ShConfig> {
        ShConfig::read(path)?.with_env_overrides()
    }

    fn read(path: &Path) -> Result<ShConfig> {
        debug!("Loading configuration from {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    fn with_env_overrides(self) -> Result<ShConfig> {
        self.with_overrides(|key| env::var(key).ok())
    }

    /// Apply `SH_*` overrides looked up by `lookup`.
    fn with_overrides<F>(mut self, lookup: F) -> Result<ShConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = parsed(&lookup, "SH_CLIENT_ID")? {
            self.sh_client_id = value;
        }
        if let Some(value) = parsed(&lookup, "SH_CLIENT_SECRET")? {
            self.sh_client_secret = value;
        }
        if let Some(value) = parsed(&lookup, "SH_BASE_URL")? {
            self.sh_base_url = value;
        }
        if let Some(value) = parsed(&lookup, "SH_TOKEN_URL")? {
            self.sh_token_url = value;
        }
        if let Some(value) = parsed(&lookup, "SH_MAX_DOWNLOAD_ATTEMPTS")? {
            self.max_download_attempts = value;
        }
        if let Some(value) = parsed(&lookup, "SH_DOWNLOAD_SLEEP_TIME")? {
            self.download_sleep_time = value;
        }
        if let Some(value) = parsed(&lookup, "SH_DOWNLOAD_TIMEOUT_SECONDS")? {
            self.download_timeout_seconds = value;
        }
        if let Some(value) = parsed(&lookup, "SH_N_INTERVAL_RETRIES")? {
            self.n_interval_retries = value;
        }
        Ok(self)
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.sh_base_url.trim_end_matches('/')
    }

    pub fn has_credentials(&self) -> bool {
        !self.sh_client_id.is_empty() && !self.sh_client_secret.is_empty()
    }
}
