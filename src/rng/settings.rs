//! Persistent generator settings
//!
//! Stores device selection, detector tuning and the pause flag in a JSON
//! file at `<data_dir>/clickrng/settings.json`. Unknown or missing fields
//! fall back to defaults, so old files keep loading across upgrades.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_sample_rate() -> u32 {
    crate::DEFAULT_SAMPLE_RATE
}

fn default_threshold() -> i32 {
    crate::DEFAULT_THRESHOLD
}

fn default_lock_time_ns() -> u64 {
    crate::DEFAULT_LOCK_TIME_NS
}

fn default_bias_compensation() -> bool {
    true
}

/// Persistent generator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorSettings {
    /// Selected input device name (None = system default)
    #[serde(default)]
    pub device: Option<String>,
    /// Sample rate in Hz
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Click threshold in raw signed sample units
    #[serde(default = "default_threshold")]
    pub threshold: i32,
    /// Click lockout in nanoseconds
    #[serde(default = "default_lock_time_ns")]
    pub lock_time_ns: u64,
    /// Whether the alternating-inversion bias compensation is active
    #[serde(default = "default_bias_compensation")]
    pub bias_compensation: bool,
    /// Whether generation was paused when the settings were saved
    #[serde(default)]
    pub paused: bool,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: default_sample_rate(),
            threshold: default_threshold(),
            lock_time_ns: default_lock_time_ns(),
            bias_compensation: default_bias_compensation(),
            paused: false,
        }
    }
}

impl GeneratorSettings {
    /// Settings file path: `<data_dir>/clickrng/settings.json`
    pub fn path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("clickrng")
            .join("settings.json")
    }

    /// Load settings from disk, falling back to defaults on any error
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(settings) => {
                    tracing::info!(path = %path.display(), "Loaded settings from disk");
                    settings
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to parse settings, using defaults");
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!(path = %path.display(), "No settings file found, using defaults");
                Self::default()
            }
        }
    }

    /// Save settings to disk, creating parent directories if needed
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!(path = %path.display(), "Settings saved to disk");
        Ok(())
    }
}
