use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
type Result<T> = anyhow::Result<T>;

/// Overrides `api_base` when set.
pub const API_BASE_ENV: &str = "CODETRACK_API_BASE";
/// Overrides `state_path` when set.
pub const STATE_PATH_ENV: &str = "CODETRACK_STATE_PATH";

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Root of the ingestion API; submissions are posted to `{api_base}/submissions`.
    pub api_base: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
    /// Re-reports of the same verdict inside this window are dropped. `0` disables it.
    #[serde(default = "default_dedup_window_secs")]
    pub dedup_window_secs: u64,
    #[serde(default = "default_event_buffer_size")]
    pub event_buffer_size: usize,
}

impl RelayConfig {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            request_timeout_secs: default_request_timeout_secs(),
            state_path: default_state_path(),
            dedup_window_secs: default_dedup_window_secs(),
            event_buffer_size: default_event_buffer_size(),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s).context("failed to deserialize relay config")?;
        config.validate()?;
        Ok(config)
    }

    /// Builds a config from environment variables alone.
    pub fn from_env() -> Result<Self> {
        let api_base = std::env::var(API_BASE_ENV)
            .with_context(|| format!("{API_BASE_ENV} is not set"))?;
        let mut config = Self::new(api_base);
        if let Ok(path) = std::env::var(STATE_PATH_ENV) {
            config.state_path = PathBuf::from(path);
        }
        config.validate()?;
        Ok(config)
    }

    /// Applies `CODETRACK_*` environment overrides on top of a file config.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        self.apply_overrides(
            std::env::var(API_BASE_ENV).ok(),
            std::env::var(STATE_PATH_ENV).ok(),
        );
        self.validate()?;
        Ok(self)
    }

    fn apply_overrides(&mut self, api_base: Option<String>, state_path: Option<String>) {
        if let Some(api_base) = api_base {
            self.api_base = api_base;
        }
        if let Some(state_path) = state_path {
            self.state_path = PathBuf::from(state_path);
        }
    }

    fn validate(&self) -> Result<()> {
        let api_base = self.api_base.trim();
        if api_base.is_empty() {
            anyhow::bail!("api_base must not be empty");
        }
        if !(api_base.starts_with("http://") || api_base.starts_with("https://")) {
            anyhow::bail!("api_base must be an http(s) url, got {api_base:?}");
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be greater than zero");
        }
        if self.event_buffer_size == 0 {
            anyhow::bail!("event_buffer_size must be greater than zero");
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn dedup_window(&self) -> Duration {
        Duration::from_secs(self.dedup_window_secs)
    }
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_state_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("codetrack")
        .join("relay-state.json")
}

fn default_dedup_window_secs() -> u64 {
    30
}

fn default_event_buffer_size() -> usize {
    256
}
