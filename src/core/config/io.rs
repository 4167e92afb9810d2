use crate::core::config::data::{path_display, Config};
use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur when loading configuration from disk.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("Failed to read config at {}: {source}", path_display(.path))]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse the configuration file as valid TOML.
    #[error("Failed to parse config at {}: {source}", path_display(.path))]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// The file parsed but holds a value the relay cannot run with.
    #[error("Invalid config at {}: {reason}", path_display(.path))]
    Invalid { path: PathBuf, reason: String },
}

impl Config {
    /// Loads `path` if given, otherwise the per-user config file. A missing
    /// file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => match Self::default_config_path() {
                Some(path) => Self::load_from_path(&path),
                None => Ok(Config::default()),
            },
        }
    }

    pub fn load_from_path(config_path: &Path) -> Result<Config, ConfigError> {
        if !config_path.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(config_path).map_err(|source| ConfigError::Read {
            path: config_path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: config_path.to_path_buf(),
            source,
        })?;
        config.validate().map_err(|reason| ConfigError::Invalid {
            path: config_path.to_path_buf(),
            reason,
        })?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        if self.provider.timeout_secs == 0 {
            return Err("provider.timeout_secs must be at least 1".to_string());
        }
        Ok(())
    }

    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "persona", "persona-relay")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}
