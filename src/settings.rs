//! Persistent user settings for the `dropzone` command.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use dropzone_core::{QueueConfig, SelectionConfig};

/// Settings stored in `<config_dir>/dropzone/settings.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Upload queue defaults.
    pub queue: QueueConfig,
    /// File selection defaults.
    pub selection: SelectionConfig,
}

impl Settings {
    /// Get the config file path.
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("dropzone").join("settings.toml"))
    }

    /// Load settings from the config directory, or return defaults.
    pub fn load() -> Self {
        Self::config_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default()
    }

    /// Load settings from `path`, or return defaults when it is missing or
    /// unreadable.
    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        match toml::from_str(&content) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring invalid settings file");
                Self::default()
            }
        }
    }

    /// Save settings to the config directory.
    pub fn save(&self) -> std::io::Result<PathBuf> {
        let path = Self::config_path().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "No config directory")
        })?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save settings to `path`, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        std::fs::write(path, content)
    }
}
