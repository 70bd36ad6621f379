//! Engine configuration, read from TOML.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sg_engine::SchedulerConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("{0} must be positive")]
    NotPositive(&'static str),
}

/// Timing and rendering settings. Every key is optional.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How far ahead the scheduler commits subdivisions.
    pub look_ahead_secs: f64,
    /// Interval between scheduler passes.
    pub timer_interval_ms: u64,
    /// Gap between `start` and the first subdivision.
    pub start_offset_secs: f64,
    /// Extra time after a release before a voice is reused.
    pub release_margin_secs: f64,
    /// Sample rate for offline rendering; live playback uses the device's.
    pub sample_rate: u32,
    /// Frames rendered per block.
    pub block_size: usize,
    /// Audio queued ahead of the device.
    pub buffer_ms: u32,
    pub reverb_debounce_ms: u64,
    /// UI refresh interval used by `play`.
    pub frame_interval_ms: u64,
    /// Fixed PRNG seed for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            look_ahead_secs: 0.1,
            timer_interval_ms: 25,
            start_offset_secs: 0.05,
            release_margin_secs: 0.1,
            sample_rate: 44_100,
            block_size: 128,
            buffer_ms: 50,
            reverb_debounce_ms: 50,
            frame_interval_ms: 16,
            seed: None,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.look_ahead_secs > 0.0) {
            return Err(ConfigError::NotPositive("look_ahead_secs"));
        }
        if self.timer_interval_ms == 0 {
            return Err(ConfigError::NotPositive("timer_interval_ms"));
        }
        if self.sample_rate == 0 {
            return Err(ConfigError::NotPositive("sample_rate"));
        }
        if self.block_size == 0 {
            return Err(ConfigError::NotPositive("block_size"));
        }
        Ok(())
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            look_ahead: self.look_ahead_secs,
            start_offset: self.start_offset_secs.max(0.0),
            release_margin: self.release_margin_secs.max(0.0),
        }
    }

    pub fn reverb_debounce(&self) -> Duration {
        Duration::from_millis(self.reverb_debounce_ms)
    }

    /// Frames between scheduler passes at `sample_rate`.
    pub fn timer_frames(&self, sample_rate: u32) -> u64 {
        (self.timer_interval_ms * sample_rate as u64 / 1000).max(1)
    }
}
