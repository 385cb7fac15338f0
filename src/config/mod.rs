use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::audio::mpeg::{MAX_FRAME_BYTES, MAX_FRAME_SAMPLES};
use crate::audio::ring_buffer::OverflowPolicy;
use crate::error::ConfigError;

const CONFIG_DIR_NAME: &str = "voice-stream-player";

/// Player configuration structure
///
/// Every field falls back to its default when missing from the TOML file, so a
/// partial file only overrides what it names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Compressed-byte ring buffer size
    pub ring_buffer_capacity: usize,
    pub overflow_policy: OverflowPolicy,
    /// Bounded depth of the state transition queue
    pub state_queue_depth: usize,
    /// Playing with no decodable data for this long finishes the session
    pub starvation_timeout_ms: u64,
    pub priming_threshold_bytes: usize,
    pub priming_window_ms: u64,
    pub idle_poll_ms: u64,
    pub active_poll_ms: u64,
    pub start_timeout_ms: u64,
    pub handshake_warn_ms: u64,
    pub write_retry_ms: u64,
    /// Decoder staging buffer for compressed bytes
    pub raw_buffer_size: usize,
    /// PCM arena size in interleaved samples
    pub pcm_buffer_samples: usize,
    pub default_volume: f32,
    pub output_device: Option<String>,
    pub max_output_latency_ms: u64,
    pub alert_directory: PathBuf,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            ring_buffer_capacity: 128 * 1024,
            overflow_policy: OverflowPolicy::Reject,
            state_queue_depth: 16,
            starvation_timeout_ms: 5000,
            priming_threshold_bytes: 3 * 1024,
            priming_window_ms: 1000,
            idle_poll_ms: 20,
            active_poll_ms: 5,
            start_timeout_ms: 1000,
            handshake_warn_ms: 2000,
            write_retry_ms: 5,
            raw_buffer_size: 1940,
            pcm_buffer_samples: 576 * 2 * 2,
            default_volume: 0.8,
            output_device: None,
            max_output_latency_ms: 250,
            alert_directory: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config")
                .join(CONFIG_DIR_NAME)
                .join("alerts"),
        }
    }
}

impl PlayerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_zero: [(&'static str, u64); 11] = [
            ("ring_buffer_capacity", self.ring_buffer_capacity as u64),
            ("state_queue_depth", self.state_queue_depth as u64),
            ("starvation_timeout_ms", self.starvation_timeout_ms),
            ("priming_threshold_bytes", self.priming_threshold_bytes as u64),
            ("priming_window_ms", self.priming_window_ms),
            ("idle_poll_ms", self.idle_poll_ms),
            ("active_poll_ms", self.active_poll_ms),
            ("start_timeout_ms", self.start_timeout_ms),
            ("handshake_warn_ms", self.handshake_warn_ms),
            ("write_retry_ms", self.write_retry_ms),
            ("max_output_latency_ms", self.max_output_latency_ms),
        ];
        for (field, value) in non_zero {
            if value == 0 {
                return Err(ConfigError::Invalid { field, reason: "must be non-zero".to_string() });
            }
        }

        if self.raw_buffer_size < MAX_FRAME_BYTES {
            return Err(ConfigError::Invalid {
                field: "raw_buffer_size",
                reason: format!("must hold the largest frame ({} bytes)", MAX_FRAME_BYTES),
            });
        }

        if self.pcm_buffer_samples < MAX_FRAME_SAMPLES {
            return Err(ConfigError::Invalid {
                field: "pcm_buffer_samples",
                reason: format!("must hold one decoded frame ({} samples)", MAX_FRAME_SAMPLES),
            });
        }

        if !(0.0..=1.0).contains(&self.default_volume) {
            return Err(ConfigError::Invalid {
                field: "default_volume",
                reason: format!("{} is outside 0.0..=1.0", self.default_volume),
            });
        }

        Ok(())
    }

    pub fn starvation_timeout(&self) -> Duration {
        Duration::from_millis(self.starvation_timeout_ms)
    }

    pub fn priming_window(&self) -> Duration {
        Duration::from_millis(self.priming_window_ms)
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    pub fn active_poll(&self) -> Duration {
        Duration::from_millis(self.active_poll_ms)
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms)
    }

    pub fn handshake_warn(&self) -> Duration {
        Duration::from_millis(self.handshake_warn_ms)
    }

    pub fn write_retry(&self) -> Duration {
        Duration::from_millis(self.write_retry_ms)
    }

    pub fn max_output_latency(&self) -> Duration {
        Duration::from_millis(self.max_output_latency_ms)
    }
}

/// Configuration manager for loading and saving settings
pub struct ConfigManager {
    config: PlayerConfig,
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self, ConfigError> {
        let config_path = Self::default_config_path()?;
        Ok(Self::with_path(config_path))
    }

    /// Manager bound to an explicit file; a missing or unreadable file yields defaults
    pub fn with_path(config_path: PathBuf) -> Self {
        let config = match Self::load_config(&config_path) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Ignoring configuration at {}: {}", config_path.display(), e);
                PlayerConfig::default()
            }
        };

        Self {
            config,
            config_path,
        }
    }

    pub fn get_config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn update_config<F>(&mut self, updater: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut PlayerConfig),
    {
        let mut updated = self.config.clone();
        updater(&mut updated);
        updated.validate()?;
        self.config = updated;
        self.save_config()
    }

    pub fn set_volume(&mut self, volume: f32) -> Result<(), ConfigError> {
        self.config.default_volume = volume.clamp(0.0, 1.0);
        self.save_config()
    }

    pub fn set_output_device(&mut self, device: Option<String>) -> Result<(), ConfigError> {
        self.config.output_device = device;
        self.save_config()
    }

    pub fn reset_to_defaults(&mut self) -> Result<(), ConfigError> {
        self.config = PlayerConfig::default();
        self.save_config()
    }

    fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::home_dir()
            .ok_or(ConfigError::ConfigDirNotFound)?
            .join(".config")
            .join(CONFIG_DIR_NAME);

        std::fs::create_dir_all(&config_dir)?;

        Ok(config_dir.join("config.toml"))
    }

    fn load_config(path: &Path) -> Result<PlayerConfig, ConfigError> {
        if !path.exists() {
            return Ok(PlayerConfig::default());
        }

        let config_content = std::fs::read_to_string(path)?;
        let config: PlayerConfig = toml::from_str(&config_content)?;
        config.validate()?;

        Ok(config)
    }

    fn save_config(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let config_content = toml::to_string_pretty(&self.config)?;
        std::fs::write(&self.config_path, config_content)?;

        Ok(())
    }
}
