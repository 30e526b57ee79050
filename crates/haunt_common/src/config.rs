//! System configuration (`configs.yaml`): hardware layout, detection tuning
//! and logging.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[cfg(feature = "ecs")]
use bevy::prelude::Resource;

use crate::error::{ConfigError, ConfigResult};
use crate::seconds;

/// Top level of `configs.yaml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub hardware: HardwareConfig,
    pub detection: DetectionConfig,
    pub logging: LoggingConfig,
}

impl SystemConfig {
    /// Read, parse and validate the system configuration.
    ///
    /// A relative audio `base_path` is resolved against the directory the
    /// configuration file lives in.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_yaml(&text).map_err(|e| e.in_file(path))?;

        if config.hardware.audio.base_path.is_relative() {
            if let Some(dir) = path.parent() {
                config.hardware.audio.base_path = dir.join(&config.hardware.audio.base_path);
            }
        }
        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> ConfigResult<Self> {
        let config: SystemConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.detection.validate()?;
        for (name, sensor) in &self.hardware.sensors {
            if !(sensor.max_distance.is_finite() && sensor.max_distance > 0.0) {
                return Err(ConfigError::invalid(
                    format!("hardware.sensors.{name}.max_distance"),
                    "must be a positive distance in cm",
                ));
            }
        }
        if let Some(govee) = &self.hardware.lights.govee {
            if !(govee.flash_delay.is_finite() && govee.flash_delay >= 0.0) {
                return Err(ConfigError::invalid(
                    "hardware.lights.govee.flash_delay",
                    "must be a non-negative number of seconds",
                ));
            }
        }
        Ok(())
    }
}

/// Which driver family backs the actuators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Everything simulated and logged
    #[default]
    Simulated,
    /// Network light and external audio player; GPIO stays simulated
    Live,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    pub backend: Backend,
    pub motor: Option<MotorConfig>,
    pub relays: IndexMap<String, RelayConfig>,
    pub sensors: IndexMap<String, SensorConfig>,
    pub lights: LightsConfig,
    pub audio: AudioConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotorConfig {
    #[serde(default = "default_forward_pin")]
    pub forward_pin: u8,
    #[serde(default = "default_reverse_pin")]
    pub reverse_pin: u8,
}

fn default_forward_pin() -> u8 {
    5
}

fn default_reverse_pin() -> u8 {
    6
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    pub pin: u8,
    #[serde(default = "default_true")]
    pub active_high: bool,
}

fn default_true() -> bool {
    true
}

/// HC-SR04 style ultrasonic sensor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    pub trigger_pin: u8,
    pub echo_pin: u8,
    /// Readings beyond this range (cm) are discarded
    #[serde(default = "default_max_distance")]
    pub max_distance: f64,
    /// Readings cycled by the simulated backend; `null` is a timeout
    #[serde(default)]
    pub simulated_readings: Vec<Option<f64>>,
}

fn default_max_distance() -> f64 {
    400.0
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LightsConfig {
    pub govee: Option<GoveeConfig>,
}

/// LAN-controlled smart light.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoveeConfig {
    pub ip: String,
    #[serde(default = "default_govee_port")]
    pub port: u16,
    /// Seconds between toggles when flashing
    #[serde(default = "default_flash_delay")]
    pub flash_delay: f64,
}

impl GoveeConfig {
    pub fn flash_delay(&self) -> Duration {
        seconds(self.flash_delay)
    }
}

fn default_govee_port() -> u16 {
    4003
}

fn default_flash_delay() -> f64 {
    0.3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub base_path: PathBuf,
    /// External player used by the live backend
    pub player: String,
    /// Extra arguments placed before the file path; `{volume}` is replaced
    /// by the effect volume in percent
    pub player_args: Vec<String>,
    /// Track name -> file name under `base_path`
    pub files: IndexMap<String, String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("music_files"),
            player: "mpg123".to_string(),
            player_args: vec!["-q".to_string()],
            files: IndexMap::new(),
        }
    }
}

impl AudioConfig {
    pub fn track_path(&self, file: &str) -> PathBuf {
        self.base_path.join(file)
    }
}

/// Detection tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "ecs", derive(Resource))]
#[serde(default)]
pub struct DetectionConfig {
    /// Warning threshold in cm
    pub distance_threshold_far: f64,
    /// Trigger threshold in cm
    pub distance_threshold_near: f64,
    /// Seconds between sensor polls
    pub sensor_reading_interval: f64,
    /// Seconds after a trigger before the loop may return to idle
    pub reset_timeout: f64,
    /// Color the light by detection mode while no scene runs
    pub mode_lights: bool,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            distance_threshold_far: 100.0,
            distance_threshold_near: 50.0,
            sensor_reading_interval: 0.5,
            reset_timeout: 10.0,
            mode_lights: true,
        }
    }
}

impl DetectionConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        let near = self.distance_threshold_near;
        let far = self.distance_threshold_far;
        if !(near.is_finite() && near > 0.0) {
            return Err(ConfigError::invalid(
                "detection.distance_threshold_near",
                "must be a positive distance in cm",
            ));
        }
        if !(far.is_finite() && far > near) {
            return Err(ConfigError::invalid(
                "detection.distance_threshold_far",
                "must be greater than distance_threshold_near",
            ));
        }
        if !(self.sensor_reading_interval.is_finite() && self.sensor_reading_interval > 0.0) {
            return Err(ConfigError::invalid(
                "detection.sensor_reading_interval",
                "must be a positive number of seconds",
            ));
        }
        if !(self.reset_timeout.is_finite() && self.reset_timeout >= 0.0) {
            return Err(ConfigError::invalid(
                "detection.reset_timeout",
                "must be a non-negative number of seconds",
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        seconds(self.sensor_reading_interval)
    }

    pub fn reset_after(&self) -> Duration {
        seconds(self.reset_timeout)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` wins when set
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
