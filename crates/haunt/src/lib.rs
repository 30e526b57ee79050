//! Scene execution engine for a motion-triggered animatronic prop.
//!
//! Scenes are timed sequences of effect bundles (lights, audio, motor,
//! relays). This crate drives them against abstract actuators:
//!
//! - [`actuators`]: driver traits and the concurrency-aware handles
//! - [`registry`]: the named actuators a scene can address
//! - [`dispatcher`]: one step's bundle to actuator calls, without waiting
//! - [`executor`]: step timing, failure policy, one scene at a time
//! - [`cleanup`]: the emergency path to a safe state
//! - [`detection`]: sensor aggregation and the trigger state machine
//! - [`selection`]: which scene a trigger runs
//! - [`sim`]: recording drivers for the simulated backend and tests
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use haunt::prelude::*;
//! use haunt::sim::{EventLog, SimMotor};
//!
//! # async fn demo(document: haunt_common::SceneDocument) {
//! let log = EventLog::new();
//! let registry = HardwareRegistry::new().with_motor(Motor::new("motor", SimMotor::new("motor", log)));
//! let runner = SceneRunner::new(Arc::new(registry), EmergencyCleanup::from_config(&document.error_handling));
//!
//! let report = runner.run_named(&document, "halloween_sequence").await;
//! assert!(report.is_success());
//! # }
//! ```

pub mod actuators;
pub mod cleanup;
pub mod detection;
pub mod dispatcher;
pub mod executor;
pub mod registry;
pub mod selection;
pub mod sim;
pub mod tasks;

pub use actuators::{DeviceError, DeviceResult};
pub use cleanup::{CleanupFailure, CleanupReport, EmergencyCleanup};
pub use detection::{DetectionMode, DetectionState, DistanceSensor, Observation, Suppression};
pub use dispatcher::{DispatchFailure, DispatchReport, EffectDispatcher};
pub use executor::{RunState, SceneOutcome, SceneReport, SceneRunner, StepFailure};
pub use registry::HardwareRegistry;
pub use selection::SceneSelector;
pub use tasks::{EffectFault, EffectTasks};

/// Commonly used types.
pub mod prelude {
    pub use crate::actuators::{
        AudioChannel, DeviceError, DeviceResult, Light, Motor, Relay, Rgb,
    };
    pub use crate::cleanup::EmergencyCleanup;
    pub use crate::detection::{DetectionMode, DetectionState, DistanceSensor};
    pub use crate::executor::{SceneOutcome, SceneReport, SceneRunner};
    pub use crate::registry::HardwareRegistry;
    pub use crate::selection::SceneSelector;
}
