//! Errors raised while loading configuration and scene documents.

use std::path::PathBuf;
use thiserror::Error;

/// Error type for configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid YAML or does not match the schema
    #[error("failed to parse YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// Parse error with the file it came from
    #[error("failed to parse {path}: {source}")]
    ParseFile {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A step carries an invalid value
    #[error("scene '{scene}' step {step}: {reason}")]
    InvalidStep {
        scene: String,
        step: u32,
        reason: String,
    },

    /// A setting references a scene that is not defined
    #[error("{key} references unknown scene '{name}'")]
    UnknownScene { key: String, name: String },

    /// A scalar setting is out of range
    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Attach the source file to a parse error.
    pub(crate) fn in_file(self, path: impl Into<PathBuf>) -> Self {
        match self {
            ConfigError::Parse(source) => ConfigError::ParseFile {
                path: path.into(),
                source,
            },
            other => other,
        }
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
