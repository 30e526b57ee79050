//! Actuator contracts and the handles the engine drives them through.
//!
//! Each actuator family has a small synchronous driver trait that a backend
//! implements (simulated, GPIO, network light, external player), and a
//! cloneable handle that owns the concurrency rules for that family:
//!
//! - [`Motor`]: one move at a time, always de-energized when a move ends
//! - [`Relay`]: idempotent on/off with a generation-checked timed auto-off
//! - [`Light`]: validated color, flash sequences serialized per light
//! - [`AudioChannel`]: a single playback per channel, re-entry is rejected

mod audio;
mod light;
mod motor;
mod relay;

pub use audio::{AudioChannel, AudioDriver};
pub use light::{Light, LightCommand, LightDriver, Rgb};
pub use motor::{Motor, MotorDirection, MotorDriver};
pub use relay::{Relay, RelayDriver};

use thiserror::Error;

/// Error type for actuator operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeviceError {
    /// Device is not connected
    #[error("Device not connected")]
    NotConnected,

    /// Device is busy and cannot accept commands
    #[error("Device busy")]
    Busy,

    /// Invalid command for this device
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// Command send failed (socket error, player exited, etc.)
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// The hardware is in an unknown or unsafe state
    #[error("Hardware fault: {0}")]
    Fault(String),
}

impl DeviceError {
    /// Whether this error must abort the running scene and trigger cleanup.
    ///
    /// Everything except [`DeviceError::Fault`] is reported and the scene
    /// carries on.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DeviceError::Fault(_))
    }
}

/// Result type for actuator operations.
pub type DeviceResult<T> = Result<T, DeviceError>;
