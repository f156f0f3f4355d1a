//! Error types shared across the collector
//!
//! Errors raised while validating identifiers or loading configuration.

use thiserror::Error;

/// Main error type for core operations
#[derive(Error, Debug)]
pub enum CoreError {
    // ===== Identity Errors =====
    /// Node identifier does not have the expected length
    #[error("Invalid node ID '{id}': expected {expected} characters, got {got}")]
    InvalidNodeId {
        /// The rejected identifier
        id: String,
        /// Required length
        expected: usize,
        /// Actual length
        got: usize,
    },

    // ===== Configuration Errors =====
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be parsed
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    // ===== General Errors =====
    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Check if this is a configuration problem (fatal at startup)
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            CoreError::InvalidConfig(_) | CoreError::ConfigParse(_)
        )
    }

    /// Get an error code for logging
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::InvalidNodeId { .. } => "INVALID_NODE_ID",
            CoreError::InvalidConfig(_) => "INVALID_CONFIG",
            CoreError::ConfigParse(_) => "CONFIG_PARSE",
            CoreError::Serialization(_) => "SERIALIZATION",
            CoreError::Io(_) => "IO_ERROR",
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for CoreError {
    fn from(err: toml::de::Error) -> Self {
        CoreError::ConfigParse(err.to_string())
    }
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
