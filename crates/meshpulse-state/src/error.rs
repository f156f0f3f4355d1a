//! Error types for the registry and persistence layer

use thiserror::Error;

/// Registry, state file and sink failures
#[derive(Error, Debug)]
pub enum StateError {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// State file I/O failed
    #[error("State file error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// The writer task is gone
    #[error("Sink closed")]
    Closed,
}

impl StateError {
    /// Get error code for logging
    pub fn error_code(&self) -> &'static str {
        match self {
            StateError::Database(_) => "DATABASE",
            StateError::Serialization(_) => "SERIALIZATION",
            StateError::Deserialization(_) => "DESERIALIZATION",
            StateError::Io(_) => "IO",
            StateError::Connection(_) => "CONNECTION",
            StateError::Closed => "CLOSED",
        }
    }
}

impl From<sqlx::Error> for StateError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                StateError::Connection(err.to_string())
            }
            sqlx::Error::Configuration(e) => StateError::Connection(e.to_string()),
            sqlx::Error::Database(db_err) => StateError::Database(db_err.to_string()),
            _ => StateError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            StateError::Deserialization(err.to_string())
        } else {
            StateError::Serialization(err.to_string())
        }
    }
}

/// Result type for state operations
pub type Result<T> = std::result::Result<T, StateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_error_is_deserialization() {
        let err: StateError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert_eq!(err.error_code(), "DESERIALIZATION");
    }

    #[test]
    fn test_pool_closed_is_connection() {
        let err: StateError = sqlx::Error::PoolClosed.into();
        assert_eq!(err.error_code(), "CONNECTION");
    }
}
