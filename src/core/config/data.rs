use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::config::defaults;

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address the relay binds to, e.g. "127.0.0.1:8000"
    pub bind: String,
    /// Browser origins allowed by the CORS layer
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: defaults::BIND_ADDRESS.to_string(),
            allowed_origins: defaults::ALLOWED_ORIGINS
                .iter()
                .map(|origin| origin.to_string())
                .collect(),
        }
    }
}

/// Upstream chat-completions provider settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    /// Upper bound for a blocking call, time-to-first-response and stream idle gaps
    pub timeout_secs: u64,
    /// Extra attempts for transient failures of blocking calls
    pub max_retries: u32,
    /// Delay before the first retry; doubles on every further attempt
    pub retry_backoff_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::PROVIDER_BASE_URL.to_string(),
            model: defaults::PROVIDER_MODEL.to_string(),
            api_key_env: defaults::API_KEY_ENV.to_string(),
            timeout_secs: defaults::TIMEOUT_SECS,
            max_retries: defaults::MAX_RETRIES,
            retry_backoff_ms: defaults::RETRY_BACKOFF_MS,
        }
    }
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Sampling parameters forwarded verbatim to the provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            temperature: defaults::TEMPERATURE,
            max_tokens: defaults::MAX_TOKENS,
            top_p: defaults::TOP_P,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub provider: ProviderConfig,
    pub sampling: SamplingConfig,
}

/// Get a user-friendly display string for a path
/// Converts absolute paths under the home directory to `~` notation on Unix-like systems
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}
