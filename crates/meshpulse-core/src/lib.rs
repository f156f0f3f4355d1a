//! Meshpulse Core - Foundational types for the respond collector
//!
//! This crate provides the data model shared by every part of the collector:
//! the decoded respond payloads, the aggregate node record kept by the
//! registry, derived links and global statistics, plus configuration.
//!
//! # Modules
//!
//! - [`data`] - Decoded respond fragments (`nodeinfo`, `statistics`, `neighbours`)
//! - [`node`] - Node identifiers, aggregate node state and links
//! - [`location`] - Geographic position reported by a node
//! - [`stats`] - Per site/domain aggregate counters
//! - [`config`] - Configuration types and file loading
//! - [`error`] - Core error types
//!
//! # Example
//!
//! ```rust
//! use meshpulse_core::{NodeId, ResponseData};
//!
//! let data: ResponseData = serde_json::from_str(
//!     r#"{"nodeinfo": {"node_id": "aabbccddeeff", "hostname": "gw01"}}"#,
//! ).unwrap();
//!
//! let id = NodeId::new(data.nodeinfo.as_ref().unwrap().node_id.clone()).unwrap();
//! assert_eq!(id.as_str(), "aabbccddeeff");
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod location;
pub mod node;
pub mod stats;

// Re-exports for convenience
pub use error::{CoreError, Result};

pub use config::{
    Config, DatabaseConfig, HttpConfig, InterfaceConfig, NodesConfig, RespondConfig, RespondConfigBuilder,
    SiteConfig, DEFAULT_MULTICAST_ADDRESS, DEFAULT_QUEUE_SIZE, DEFAULT_REQUEST_PORT,
};
pub use data::{Neighbours, NodeInfo, ResponseData, Statistics, REQUEST_COMMAND};
pub use location::Location;
pub use node::{Link, Node, NodeId, NODE_ID_LEN};
pub use stats::{CounterMap, GlobalStats};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
