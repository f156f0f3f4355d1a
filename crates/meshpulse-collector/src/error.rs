//! Error types for collector operations
//!
//! Socket setup failures abort startup. Decode failures only ever concern a
//! single datagram and are logged and dropped by the decoder.

use thiserror::Error;

use meshpulse_core::CoreError;

/// Main error type for collector operations
#[derive(Error, Debug)]
pub enum CollectorError {
    // ===== Interface Errors =====
    /// No usable address on the interface
    #[error("Unable to find a unicast address for {ifname}: {reason}")]
    NoUnicastAddress {
        /// Interface name
        ifname: String,
        /// Why discovery failed
        reason: String,
    },

    /// Socket setup failed
    #[error("Socket setup on {ifname} failed: {source}")]
    Socket {
        /// Interface name
        ifname: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// No socket with the requested index
    #[error("No interface with index {0}")]
    NoSuchInterface(usize),

    /// Destination family does not match the socket
    #[error("Interface {ifname} cannot reach {destination}")]
    Unreachable {
        /// Interface name
        ifname: String,
        /// Requested destination
        destination: std::net::IpAddr,
    },

    // ===== Decode Errors =====
    /// Payload is not valid raw deflate
    #[error("Decompression failed: {0}")]
    Decompress(String),

    /// Payload is not a valid response document
    #[error("JSON parse failed: {0}")]
    Parse(String),

    /// No fragment carries a node id
    #[error("Response carries no node id")]
    MissingNodeId,

    /// The node id is malformed
    #[error("Invalid node id: {0}")]
    InvalidNodeId(String),

    // ===== Lifecycle Errors =====
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// start was called twice
    #[error("Collector already started")]
    AlreadyStarted,

    /// A task ended abnormally
    #[error("Task failed: {0}")]
    Task(String),

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CollectorError {
    /// Check if this error concerns a single bad datagram
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            CollectorError::Decompress(_)
                | CollectorError::Parse(_)
                | CollectorError::MissingNodeId
                | CollectorError::InvalidNodeId(_)
        )
    }

    /// Get an error code for logging
    pub fn error_code(&self) -> &'static str {
        match self {
            CollectorError::NoUnicastAddress { .. } => "NO_UNICAST_ADDRESS",
            CollectorError::Socket { .. } => "SOCKET",
            CollectorError::NoSuchInterface(_) => "NO_SUCH_INTERFACE",
            CollectorError::Unreachable { .. } => "UNREACHABLE",
            CollectorError::Decompress(_) => "DECOMPRESS",
            CollectorError::Parse(_) => "PARSE",
            CollectorError::MissingNodeId => "MISSING_NODE_ID",
            CollectorError::InvalidNodeId(_) => "INVALID_NODE_ID",
            CollectorError::InvalidConfig(_) => "INVALID_CONFIG",
            CollectorError::AlreadyStarted => "ALREADY_STARTED",
            CollectorError::Task(_) => "TASK",
            CollectorError::Io(_) => "IO_ERROR",
        }
    }
}

impl From<CoreError> for CollectorError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidNodeId { .. } => CollectorError::InvalidNodeId(err.to_string()),
            CoreError::InvalidConfig(msg) => CollectorError::InvalidConfig(msg),
            CoreError::Io(e) => CollectorError::Io(e),
            other => CollectorError::InvalidConfig(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for CollectorError {
    fn from(err: serde_json::Error) -> Self {
        CollectorError::Parse(err.to_string())
    }
}

/// Result type alias for collector operations
pub type Result<T> = std::result::Result<T, CollectorError>;
