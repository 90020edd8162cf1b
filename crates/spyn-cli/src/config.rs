//! Configuration management for the spyn CLI

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use spyn_runtime::RetryPolicy;

use crate::error::{CliError, CliResult};

/// Global CLI configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Directory output blocks are written to when no `--out` is given
    pub output_dir: Option<PathBuf>,

    /// Default logging level
    pub log_level: Option<String>,

    /// Retry behaviour of `spyn run --retry`
    pub retry: RetrySettings,
}

/// Overrides for the environment-derived retry policy
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Number of tries; the environment decides when unset
    pub max_tries: Option<u32>,

    /// Pause between tries (ms)
    pub retry_delay_ms: u64,

    /// File every failed try is appended to
    pub error_log: Option<PathBuf>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            log_level: Some("info".to_string()),
            retry: RetrySettings::default(),
        }
    }
}

impl CliConfig {
    /// Load configuration from file
    pub fn load_from_file(path: &Path) -> CliResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: &Path) -> CliResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| CliError::config(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> CliResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| CliError::config("Could not determine config directory"))?;
        Ok(config_dir.join("spyn").join("config.toml"))
    }

    /// Explicit path if given, else the default location
    pub fn load(path: Option<&Path>) -> CliResult<Self> {
        match path {
            Some(path) => {
                if !path.exists() {
                    return Err(CliError::missing_resource(format!(
                        "config file {}",
                        path.display()
                    )));
                }
                Self::load_from_file(path)
            }
            None => match Self::default_config_path() {
                Ok(path) => Self::load_from_file(&path),
                Err(_) => Ok(Self::default()),
            },
        }
    }

    /// Retry policy: environment defaults with this file's overrides
    pub fn retry_policy(&self) -> RetryPolicy {
        let mut policy = RetryPolicy::from_env()
            .with_retry_delay(Duration::from_millis(self.retry.retry_delay_ms));
        if let Some(max_tries) = self.retry.max_tries {
            policy = policy.with_max_tries(max_tries);
        }
        if let Some(path) = &self.retry.error_log {
            policy = policy.with_error_log(path);
        }
        policy
    }
}
