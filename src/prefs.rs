use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::{AppError, Result};

/// Local display preferences. Shared by every account on this machine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub dark_mode: bool,
}

impl Preferences {
    /// Reads the file, or falls back to defaults when it does not exist yet.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Flips dark mode and writes the result to `path`.
    pub fn toggle_dark_mode(&mut self, path: &Path) -> Result<bool> {
        self.dark_mode = !self.dark_mode;
        self.save_to(path)?;
        tracing::debug!("Dark mode is now {}", if self.dark_mode { "on" } else { "off" });
        Ok(self.dark_mode)
    }

    pub fn prefs_path() -> PathBuf {
        Config::config_dir().join("prefs.toml")
    }
}
