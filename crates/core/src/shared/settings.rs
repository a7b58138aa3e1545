use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detection::domain::mode::VisionMode;
use crate::shared::constants::{
    CALLBACK_POLL_INTERVAL, CAPTURE_POLL_INTERVAL, DEFAULT_CONFIDENCE, DEFAULT_VIEW_HEIGHT,
    DEFAULT_VIEW_WIDTH, SETTINGS_DIR_NAME,
};

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to read settings from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write settings to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed settings: {0}")]
    Json(#[from] serde_json::Error),
    #[error("could not determine config directory")]
    NoConfigDir,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    pub default_mode: VisionMode,
    pub confidence: f64,
    pub view_width: u32,
    pub view_height: u32,
    #[serde(default = "default_capture_poll_ms")]
    pub capture_poll_ms: u64,
    #[serde(default = "default_callback_poll_ms")]
    pub callback_poll_ms: u64,
    #[serde(default)]
    pub model_path: Option<PathBuf>,
}

fn default_capture_poll_ms() -> u64 {
    CAPTURE_POLL_INTERVAL.as_millis() as u64
}

fn default_callback_poll_ms() -> u64 {
    CALLBACK_POLL_INTERVAL.as_millis() as u64
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            default_mode: VisionMode::None,
            confidence: DEFAULT_CONFIDENCE,
            view_width: DEFAULT_VIEW_WIDTH,
            view_height: DEFAULT_VIEW_HEIGHT,
            capture_poll_ms: default_capture_poll_ms(),
            callback_poll_ms: default_callback_poll_ms(),
            model_path: None,
        }
    }
}

impl AppSettings {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(SETTINGS_DIR_NAME).join("settings.json"))
    }

    /// Loads user settings, falling back to defaults when absent or unreadable.
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        Self::load_from(&path).unwrap_or_else(|e| {
            log::warn!("Ignoring settings file: {e}");
            Self::default()
        })
    }

    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let json = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn save(&self) -> Result<(), SettingsError> {
        let path = Self::config_path().ok_or(SettingsError::NoConfigDir)?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        let write_err = |source: std::io::Error| SettingsError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(write_err)
    }

    pub fn capture_poll_interval(&self) -> Duration {
        Duration::from_millis(self.capture_poll_ms.max(1))
    }

    pub fn callback_poll_interval(&self) -> Duration {
        Duration::from_millis(self.callback_poll_ms.max(1))
    }
}
