//! Shared data types for the haunt prop controller.
//!
//! - [`scene`]: scenes, steps and effect bundles
//! - [`document`]: the scene document with its settings and cleanup plan
//! - [`config`]: hardware layout, detection tuning and logging
//!
//! Everything here is plain serde data with no runtime dependencies, so the
//! engine, the device adapters and the server binary all share one
//! definition of the YAML formats.

pub mod config;
pub mod document;
pub mod error;
pub mod scene;

pub use config::{
    AudioConfig, Backend, DetectionConfig, GoveeConfig, HardwareConfig, LightsConfig,
    LoggingConfig, MotorConfig, RelayConfig, SensorConfig, SystemConfig,
};
pub use document::{
    CleanupAction, CleanupKind, ErrorHandling, SceneDocument, SceneSection, SceneSettings,
};
pub use error::{ConfigError, ConfigResult};
pub use scene::{
    AudioEffect, EffectKind, Effects, LightEffect, LogLevel, MotorAction, MotorEffect,
    RelayAction, RelayEffect, Scene, Step, StepLog,
};

use std::time::Duration;

/// Convert a seconds value from a document into a [`Duration`].
///
/// Negative, NaN and overflowing values become zero instead of panicking.
pub fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}
