//! Error types for the CLI

use thiserror::Error;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// Errors that can occur in the CLI
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Invalid argument
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Error message
        message: String,
    },

    /// A collaborator needs a cargo feature this binary was built without
    #[error("{feature} support not enabled. Rebuild with --features {feature}")]
    FeatureDisabled {
        /// Feature name
        feature: &'static str,
    },

    /// IO error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// covsynth library error
    #[error("{0}")]
    Synth(#[from] covsynth::SynthError),

    /// Malformed YAML run file
    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// JSON rendering failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid argument error
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}

impl From<covsynth::ConfigError> for CliError {
    fn from(err: covsynth::ConfigError) -> Self {
        Self::config(err.to_string())
    }
}

impl From<covsynth::ExecutionError> for CliError {
    fn from(err: covsynth::ExecutionError) -> Self {
        Self::Synth(err.into())
    }
}

impl From<covsynth::GenerationError> for CliError {
    fn from(err: covsynth::GenerationError) -> Self {
        Self::Synth(err.into())
    }
}
