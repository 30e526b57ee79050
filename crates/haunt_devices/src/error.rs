use std::path::PathBuf;
use thiserror::Error;

/// Hardware initialization failures. Any of these stops the prop from
/// starting.
#[derive(Debug, Error)]
pub enum InitError {
    /// A configured audio track has no file behind it
    #[error("audio file for track '{track}' not found at {path}")]
    MissingAudio { track: String, path: PathBuf },

    /// The light address could not be resolved
    #[error("light address '{0}' did not resolve")]
    Address(String),

    /// The UDP socket for the light could not be opened
    #[error("failed to open UDP socket for light at {addr}: {source}")]
    Socket {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Two devices claim the same GPIO pin
    #[error("{device} uses pin {pin}, already assigned to {owner}")]
    PinConflict {
        device: String,
        pin: u8,
        owner: String,
    },

    /// Detection needs at least one distance sensor
    #[error("no distance sensors configured")]
    NoSensors,
}
