//! The scene document (`scenes.yaml`).
//!
//! ```yaml
//! scenes:
//!   halloween_sequence:
//!     name: Halloween Sequence
//!     description: Lid opens, skull rises
//!     steps:
//!       - step: 1
//!         duration: 6
//!         effects:
//!           motor: { action: open, duration: 6 }
//! alternative_sequences: {}
//! settings:
//!   random_scene_mode: true
//!   random_scene_list: [halloween_sequence]
//! error_handling:
//!   emergency_cleanup:
//!     - { action: relay_off, target: skull }
//!     - { action: motor_close, target: door }
//!     - { action: lights_off, target: lights }
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{ConfigError, ConfigResult};
use crate::scene::{Scene, Step};
use crate::seconds;

/// Which section of the document a scene was declared in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneSection {
    Main,
    Alternative,
}

/// Parsed contents of the scene document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SceneDocument {
    #[serde(default)]
    pub scenes: IndexMap<String, Scene>,
    #[serde(default)]
    pub alternative_sequences: IndexMap<String, Scene>,
    #[serde(default)]
    pub settings: SceneSettings,
    #[serde(default)]
    pub error_handling: ErrorHandling,
}

impl SceneDocument {
    /// Read, parse and validate a scene document.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text).map_err(|e| e.in_file(path))
    }

    /// Parse and validate a scene document from YAML text.
    pub fn from_yaml(yaml: &str) -> ConfigResult<Self> {
        let document: SceneDocument = serde_yaml::from_str(yaml)?;
        document.validate()?;
        Ok(document)
    }

    /// Check step values and every scene reference in the settings.
    pub fn validate(&self) -> ConfigResult<()> {
        for (key, scene, _) in self.iter() {
            for step in &scene.steps {
                validate_step(key, step)?;
            }
        }

        let settings = &self.settings;
        for name in &settings.random_scene_list {
            self.require_scene("settings.random_scene_list", name)?;
        }
        if let Some(name) = &settings.startup_scene {
            self.require_scene("settings.startup_scene", name)?;
        }
        if !settings.random_scene_mode && !self.is_empty() {
            self.require_scene("settings.default_scene", &settings.default_scene)?;
        }
        if !settings.cooldown_after_sequence.is_finite() || settings.cooldown_after_sequence < 0.0 {
            return Err(ConfigError::invalid(
                "settings.cooldown_after_sequence",
                "must be a non-negative number of seconds",
            ));
        }

        let close = self.error_handling.motor_close_duration;
        if !close.is_finite() || close < 0.0 {
            return Err(ConfigError::invalid(
                "error_handling.motor_close_duration",
                "must be a non-negative number of seconds",
            ));
        }
        Ok(())
    }

    fn require_scene(&self, key: &str, name: &str) -> ConfigResult<()> {
        if self.scene(name).is_some() {
            Ok(())
        } else {
            Err(ConfigError::UnknownScene {
                key: key.to_string(),
                name: name.to_string(),
            })
        }
    }

    /// Look a scene up by key, main scenes first.
    pub fn scene(&self, name: &str) -> Option<&Scene> {
        self.scenes
            .get(name)
            .or_else(|| self.alternative_sequences.get(name))
    }

    /// Every scene with its key and section, in document order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Scene, SceneSection)> {
        let main = self
            .scenes
            .iter()
            .map(|(key, scene)| (key.as_str(), scene, SceneSection::Main));
        let alternative = self
            .alternative_sequences
            .iter()
            .map(|(key, scene)| (key.as_str(), scene, SceneSection::Alternative));
        main.chain(alternative)
    }

    pub fn len(&self) -> usize {
        self.scenes.len() + self.alternative_sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Scene keys, optionally without the designated test/maintenance scenes.
    pub fn scene_names(&self, exclude_test_scenes: bool) -> Vec<String> {
        self.iter()
            .map(|(key, _, _)| key)
            .filter(|key| !exclude_test_scenes || !self.settings.is_test_scene(key))
            .map(str::to_string)
            .collect()
    }
}

fn validate_step(scene: &str, step: &Step) -> ConfigResult<()> {
    let invalid = |reason: &str| ConfigError::InvalidStep {
        scene: scene.to_string(),
        step: step.step,
        reason: reason.to_string(),
    };

    if !step.duration.is_finite() || step.duration < 0.0 {
        return Err(invalid("duration must be a non-negative number of seconds"));
    }
    if let Some(motor) = &step.effects.motor {
        if !motor.duration.is_finite() || motor.duration < 0.0 {
            return Err(invalid("motor duration must be a non-negative number of seconds"));
        }
    }
    if let Some(relay) = &step.effects.relay {
        if relay.name.is_empty() {
            return Err(invalid("relay name must not be empty"));
        }
        if let Some(duration) = relay.duration {
            if !duration.is_finite() {
                return Err(invalid("relay duration must be a number of seconds"));
            }
        }
    }
    if let Some(audio) = &step.effects.audio {
        if audio.file.is_empty() {
            return Err(invalid("audio file must not be empty"));
        }
        if !audio.volume.is_finite() {
            return Err(invalid("audio volume must be a number"));
        }
    }
    Ok(())
}

/// Global scene settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneSettings {
    /// Pick a random scene on every trigger
    pub random_scene_mode: bool,
    /// Scenes eligible for random selection; empty means every non-test scene
    pub random_scene_list: Vec<String>,
    /// Scene used on trigger when random mode is off
    pub default_scene: String,
    /// Test and maintenance scenes never picked at random
    pub test_scenes: Vec<String>,
    /// Seconds after a trigger before another scene may start
    pub cooldown_after_sequence: f64,
    /// Scene run once at boot, before detection starts
    pub startup_scene: Option<String>,
}

impl Default for SceneSettings {
    fn default() -> Self {
        Self {
            random_scene_mode: false,
            random_scene_list: Vec::new(),
            default_scene: "halloween_sequence".to_string(),
            test_scenes: vec![
                "maintenance_mode".to_string(),
                "emergency_test".to_string(),
                "quick_scare".to_string(),
            ],
            cooldown_after_sequence: 30.0,
            startup_scene: None,
        }
    }
}

impl SceneSettings {
    pub fn is_test_scene(&self, name: &str) -> bool {
        self.test_scenes.iter().any(|test| test == name)
    }

    pub fn cooldown(&self) -> Duration {
        seconds(self.cooldown_after_sequence)
    }
}

/// `error_handling` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorHandling {
    pub emergency_cleanup: Vec<CleanupAction>,
    /// How long the motor is driven closed during cleanup
    pub motor_close_duration: f64,
}

impl Default for ErrorHandling {
    fn default() -> Self {
        Self {
            emergency_cleanup: Vec::new(),
            motor_close_duration: 6.0,
        }
    }
}

impl ErrorHandling {
    /// The cleanup sequence to run. Falls back to relays off, motor closed,
    /// lights off when the document does not list one.
    pub fn plan(&self) -> Vec<CleanupAction> {
        if self.emergency_cleanup.is_empty() {
            vec![
                CleanupAction::new(CleanupKind::RelayOff, None),
                CleanupAction::new(CleanupKind::MotorClose, None),
                CleanupAction::new(CleanupKind::LightsOff, None),
            ]
        } else {
            self.emergency_cleanup.clone()
        }
    }

    pub fn motor_close_time(&self) -> Duration {
        seconds(self.motor_close_duration)
    }
}

/// One emergency cleanup action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupAction {
    pub action: CleanupKind,
    /// Actuator name. For `relay_off`, absent or `all` means every relay.
    #[serde(default)]
    pub target: Option<String>,
}

impl CleanupAction {
    pub fn new(action: CleanupKind, target: Option<&str>) -> Self {
        Self {
            action,
            target: target.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupKind {
    RelayOff,
    MotorClose,
    LightsOff,
}
