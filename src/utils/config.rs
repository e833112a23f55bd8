//! Configuration management for reelplay
//!
//! This module handles loading and managing playback configuration
//! from config files and environment variables.

use crate::utils::error::{IntoPlayerError, PlayerError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Playback engine configuration
    pub playback: PlaybackConfig,

    /// General application settings
    pub general: GeneralConfig,
}

/// Playback engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Fill the GPU buffer before the first frame is shown
    pub prebuffer: bool,

    /// Capacity of the decoded (CPU) frame buffer
    pub cpu_buffer_size: usize,

    /// Capacity of the GPU frame buffer and upload ring
    pub gpu_buffer_size: usize,

    /// Restart from the first sample at end of stream
    pub loop_playback: bool,

    /// Initial playback rate (1.0 = normal speed)
    pub playback_rate: f64,

    /// Longest an update may wait for the frame at a seek target, in milliseconds
    pub refresh_timeout_ms: u64,
}

/// General application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            prebuffer: true,
            cpu_buffer_size: 2,
            gpu_buffer_size: 2,
            loop_playback: false,
            playback_rate: 1.0,
            refresh_timeout_ms: 50,
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from various sources
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. System config file (/etc/reelplay/config.toml on Linux)
    /// 3. User config file (~/.config/reelplay/config.toml on Linux)
    /// 4. Environment variables (REELPLAY_* prefix)
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        for path in [Self::system_config_path(), Self::user_config_path()]
            .into_iter()
            .flatten()
        {
            if path.exists() {
                config.merge_from_file(&path)?;
            }
        }

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a single file on top of the defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut config = Self::default();
        config.merge_from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the given path, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).config_err("Failed to create config directory")?;
        }

        let toml = toml::to_string_pretty(self).config_err("Failed to serialize config")?;
        std::fs::write(path, toml).config_err("Failed to write config file")?;

        Ok(())
    }

    /// Merge configuration from a TOML file
    ///
    /// Only the keys present in the file replace current values.
    fn merge_from_file(&mut self, path: &Path) -> Result<()> {
        let contents = std::fs::read_to_string(path).config_err("Failed to read config file")?;
        let overlay: toml::Table = contents.parse().config_err("Failed to parse config file")?;

        let mut base = match toml::Value::try_from(&*self).config_err("Failed to serialize config")? {
            toml::Value::Table(table) => table,
            _ => return Err(crate::internal_error!("config did not serialize to a table")),
        };
        merge_tables(&mut base, overlay);

        *self = toml::Value::Table(base)
            .try_into()
            .config_err("Invalid config file")?;

        Ok(())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(size) = std::env::var("REELPLAY_CPU_BUFFER") {
            self.playback.cpu_buffer_size = size
                .parse()
                .map_err(|_| PlayerError::Config("Invalid REELPLAY_CPU_BUFFER".to_string()))?;
        }

        if let Ok(size) = std::env::var("REELPLAY_GPU_BUFFER") {
            self.playback.gpu_buffer_size = size
                .parse()
                .map_err(|_| PlayerError::Config("Invalid REELPLAY_GPU_BUFFER".to_string()))?;
        }

        if let Ok(rate) = std::env::var("REELPLAY_PLAYBACK_RATE") {
            self.playback.playback_rate = rate
                .parse()
                .map_err(|_| PlayerError::Config("Invalid REELPLAY_PLAYBACK_RATE".to_string()))?;
        }

        if let Ok(log_level) = std::env::var("REELPLAY_LOG_LEVEL") {
            self.general.log_level = log_level;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.playback.cpu_buffer_size == 0 {
            return Err(PlayerError::Config(
                "CPU buffer size must be at least 1".to_string(),
            ));
        }

        if self.playback.gpu_buffer_size == 0 {
            return Err(PlayerError::Config(
                "GPU buffer size must be at least 1".to_string(),
            ));
        }

        if !self.playback.playback_rate.is_finite() || self.playback.playback_rate < 0.0 {
            return Err(PlayerError::Config(
                "Playback rate must be a non-negative number".to_string(),
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.general.log_level.as_str()) {
            return Err(PlayerError::Config(format!(
                "Invalid log level '{}', must be one of: {:?}",
                self.general.log_level, valid_log_levels
            )));
        }

        Ok(())
    }

    /// Get system config file path
    fn system_config_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        return Some(PathBuf::from("/etc/reelplay/config.toml"));

        #[cfg(target_os = "windows")]
        return std::env::var("PROGRAMDATA")
            .ok()
            .map(|p| PathBuf::from(p).join("Reelplay").join("config.toml"));

        #[cfg(target_os = "macos")]
        return Some(PathBuf::from("/Library/Application Support/Reelplay/config.toml"));

        #[allow(unreachable_code)]
        None
    }

    /// Get user config file path
    fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("reelplay").join("config.toml"))
    }
}

/// Recursively overlay `overlay` onto `base`
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
