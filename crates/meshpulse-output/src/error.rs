//! Output error types

use thiserror::Error;

/// Output pipeline errors
#[derive(Error, Debug)]
pub enum OutputError {
    /// No output registered under this name
    #[error("Unknown output type: {0}")]
    UnknownOutput(String),

    /// No filter registered under this name
    #[error("Unknown filter: {0}")]
    UnknownFilter(String),

    /// Output configuration rejected
    #[error("Invalid configuration for output '{name}': {reason}")]
    InvalidOutput {
        /// Output type
        name: String,
        /// What was wrong
        reason: String,
    },

    /// Filter configuration rejected
    #[error("Invalid configuration for filter '{name}': {reason}")]
    InvalidFilter {
        /// Filter name
        name: String,
        /// What was wrong
        reason: String,
    },

    /// Rendering to JSON failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Writing the rendered file failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl OutputError {
    pub(crate) fn invalid_output(name: &str, reason: impl Into<String>) -> Self {
        OutputError::InvalidOutput {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_filter(name: &str, reason: impl Into<String>) -> Self {
        OutputError::InvalidFilter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// Check if the error comes from configuration (fatal at startup)
    pub fn is_config_error(&self) -> bool {
        !matches!(self, OutputError::Serialization(_) | OutputError::Io(_))
    }

    /// Get an error code for logging
    pub fn error_code(&self) -> &'static str {
        match self {
            OutputError::UnknownOutput(_) => "UNKNOWN_OUTPUT",
            OutputError::UnknownFilter(_) => "UNKNOWN_FILTER",
            OutputError::InvalidOutput { .. } => "INVALID_OUTPUT",
            OutputError::InvalidFilter { .. } => "INVALID_FILTER",
            OutputError::Serialization(_) => "SERIALIZATION",
            OutputError::Io(_) => "IO_ERROR",
        }
    }
}

/// Result type alias for output operations
pub type Result<T> = std::result::Result<T, OutputError>;
