//! Scene model: scenes, steps and the effect bundles they fire.
//!
//! Scenes are loaded once from the scene document and never mutated after
//! that. Everything here is plain data; the engine crate interprets it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::seconds;

/// A named, ordered sequence of steps representing one triggered performance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    /// Display name of the scene
    #[serde(default)]
    pub name: String,
    /// Human readable description, shown by `haunt list`
    #[serde(default)]
    pub description: String,
    /// Steps in execution order
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Scene {
    /// Create an empty scene with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Append a step, builder style.
    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Minimum wall-clock time a full run of this scene takes.
    pub fn minimum_runtime(&self) -> Duration {
        self.steps.iter().map(Step::dwell).sum()
    }
}

/// One timed unit within a scene.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Sequence position as written in the document
    #[serde(default)]
    pub step: u32,
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
    /// Minimum dwell time in seconds
    #[serde(default)]
    pub duration: f64,
    /// Effects dispatched when the step starts
    #[serde(default)]
    pub effects: Effects,
    /// Optional log annotation emitted when the step starts
    #[serde(default)]
    pub logging: Option<StepLog>,
}

impl Step {
    pub fn new(step: u32, duration: f64) -> Self {
        Self {
            step,
            duration,
            ..Default::default()
        }
    }

    pub fn with_effects(mut self, effects: Effects) -> Self {
        self.effects = effects;
        self
    }

    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("Step {}", self.step),
        }
    }

    /// The step duration as a [`Duration`]; invalid values count as zero.
    pub fn dwell(&self) -> Duration {
        seconds(self.duration)
    }

    pub fn log_level(&self) -> LogLevel {
        self.logging.as_ref().map(|log| log.level).unwrap_or_default()
    }

    pub fn log_message(&self) -> String {
        self.logging
            .as_ref()
            .and_then(|log| log.message.clone())
            .unwrap_or_else(|| format!("Executing {}", self.display_name()))
    }
}

/// Log annotation attached to a step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepLog {
    #[serde(default)]
    pub level: LogLevel,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    #[serde(alias = "warn")]
    Warning,
    Error,
}

/// The set of effects fired by a step. Each sub-effect is optional and they
/// are conceptually concurrent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Effects {
    #[serde(default)]
    pub lights: Option<LightEffect>,
    #[serde(default)]
    pub audio: Option<AudioEffect>,
    #[serde(default)]
    pub motor: Option<MotorEffect>,
    #[serde(default)]
    pub relay: Option<RelayEffect>,
}

impl Effects {
    pub fn is_empty(&self) -> bool {
        self.lights.is_none() && self.audio.is_none() && self.motor.is_none() && self.relay.is_none()
    }

    /// Kinds present in this bundle, in dispatch order.
    pub fn kinds(&self) -> Vec<EffectKind> {
        let mut kinds = Vec::with_capacity(4);
        if self.lights.is_some() {
            kinds.push(EffectKind::Lights);
        }
        if self.audio.is_some() {
            kinds.push(EffectKind::Audio);
        }
        if self.motor.is_some() {
            kinds.push(EffectKind::Motor);
        }
        if self.relay.is_some() {
            kinds.push(EffectKind::Relay);
        }
        kinds
    }
}

/// Effect category, also the fixed dispatch order within a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectKind {
    Lights,
    Audio,
    Motor,
    Relay,
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EffectKind::Lights => "lights",
            EffectKind::Audio => "audio",
            EffectKind::Motor => "motor",
            EffectKind::Relay => "relay",
        };
        f.write_str(name)
    }
}

/// Smart light effect.
///
/// Channels are kept signed and unvalidated here so that out-of-range values
/// reach the light actuator and get rejected there rather than silently
/// wrapped by the parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightEffect {
    /// RGB triple; when absent the color is left untouched
    #[serde(default)]
    pub color: Option<[i32; 3]>,
    #[serde(default)]
    pub flash: bool,
    #[serde(default = "default_flash_amount")]
    pub flash_amount: u32,
    #[serde(default)]
    pub off: bool,
    #[serde(default)]
    pub on: bool,
}

impl Default for LightEffect {
    fn default() -> Self {
        Self {
            color: None,
            flash: false,
            flash_amount: default_flash_amount(),
            off: false,
            on: false,
        }
    }
}

fn default_flash_amount() -> u32 {
    10
}

/// Audio effect, resolved against the registered audio channels by track name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioEffect {
    pub file: String,
    #[serde(default = "default_volume")]
    pub volume: f32,
}

impl AudioEffect {
    /// Logical track identifier (the file name without an `.mp3` suffix).
    pub fn track(&self) -> &str {
        self.file.strip_suffix(".mp3").unwrap_or(&self.file)
    }
}

fn default_volume() -> f32 {
    0.7
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MotorAction {
    /// Drive forward (lid opens)
    Open,
    /// Drive in reverse (lid closes)
    Close,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotorEffect {
    pub action: MotorAction,
    #[serde(default = "default_motor_duration")]
    pub duration: f64,
}

impl MotorEffect {
    pub fn run_time(&self) -> Duration {
        seconds(self.duration)
    }
}

fn default_motor_duration() -> f64 {
    6.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayAction {
    On,
    Off,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayEffect {
    /// Logical relay name, e.g. `skull` or `smoke`
    pub name: String,
    pub action: RelayAction,
    /// Auto-off delay in seconds for `on`
    #[serde(default)]
    pub duration: Option<f64>,
}

impl RelayEffect {
    /// Auto-off delay, if this is a timed `on`.
    pub fn auto_off(&self) -> Option<Duration> {
        match (self.action, self.duration) {
            (RelayAction::On, Some(secs)) if secs > 0.0 => Some(seconds(secs)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_defaults() {
        let step: Step = serde_yaml::from_str("step: 3\nduration: 2.5").unwrap();
        assert_eq!(step.display_name(), "Step 3");
        assert_eq!(step.dwell(), Duration::from_millis(2500));
        assert_eq!(step.log_level(), LogLevel::Info);
        assert_eq!(step.log_message(), "Executing Step 3");
        assert!(step.effects.is_empty());
    }

    #[test]
    fn test_effects_parse_with_defaults() {
        let yaml = r#"
lights:
  color: [255, 0, 0]
  flash: true
audio:
  file: creepy.mp3
motor:
  action: open
relay:
  name: smoke
  action: on
  duration: 4
"#;
        let effects: Effects = serde_yaml::from_str(yaml).unwrap();
        let lights = effects.lights.as_ref().unwrap();
        assert_eq!(lights.color, Some([255, 0, 0]));
        assert_eq!(lights.flash_amount, 10);

        let audio = effects.audio.as_ref().unwrap();
        assert_eq!(audio.track(), "creepy");
        assert!((audio.volume - 0.7).abs() < f32::EPSILON);

        let motor = effects.motor.as_ref().unwrap();
        assert_eq!(motor.action, MotorAction::Open);
        assert_eq!(motor.run_time(), Duration::from_secs(6));

        let relay = effects.relay.as_ref().unwrap();
        assert_eq!(relay.auto_off(), Some(Duration::from_secs(4)));

        assert_eq!(
            effects.kinds(),
            vec![EffectKind::Lights, EffectKind::Audio, EffectKind::Motor, EffectKind::Relay]
        );
    }

    #[test]
    fn test_out_of_range_color_still_parses() {
        let lights: LightEffect = serde_yaml::from_str("color: [300, -1, 0]").unwrap();
        assert_eq!(lights.color, Some([300, -1, 0]));
    }

    #[test]
    fn test_unknown_motor_action_rejected() {
        let result: Result<MotorEffect, _> = serde_yaml::from_str("action: spin");
        assert!(result.is_err());
    }

    #[test]
    fn test_relay_auto_off_only_for_timed_on() {
        let off = RelayEffect {
            name: "skull".into(),
            action: RelayAction::Off,
            duration: Some(3.0),
        };
        assert_eq!(off.auto_off(), None);

        let zero = RelayEffect {
            name: "skull".into(),
            action: RelayAction::On,
            duration: Some(0.0),
        };
        assert_eq!(zero.auto_off(), None);
    }

    #[test]
    fn test_warn_alias_for_log_level() {
        let log: StepLog = serde_yaml::from_str("level: warn\nmessage: hi").unwrap();
        assert_eq!(log.level, LogLevel::Warning);
    }
}
