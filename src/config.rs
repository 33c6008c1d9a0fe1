use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};

/// What a store does with its rows when a reload fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadFailurePolicy {
    /// Drop the stale rows so nothing from a previous load is shown.
    #[default]
    FailClear,
    /// Keep whatever the last successful load produced.
    FailRetain,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub backend_url: Option<String>,
    pub backend_anon_key: Option<String>,
    pub gemini_api_key: Option<String>,

    #[serde(default)]
    pub load_failure_policy: LoadFailurePolicy,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: None,
            backend_anon_key: None,
            gemini_api_key: None,
            load_failure_policy: LoadFailurePolicy::default(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(config_path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    /// Backend URL and key, or `NotConfigured` when either is missing or blank.
    pub fn backend(&self) -> Result<(&str, &str)> {
        let url = self.backend_url.as_deref().map(str::trim).unwrap_or("");
        let key = self.backend_anon_key.as_deref().map(str::trim).unwrap_or("");
        if !url.starts_with("https://") && !url.starts_with("http://") || key.is_empty() {
            return Err(AppError::NotConfigured(
                Self::config_path().display().to_string(),
            ));
        }
        Ok((url, key))
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("focus-planner")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}
