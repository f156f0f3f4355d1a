//! Meshpulse State - Node registry and persistence
//!
//! This crate owns the live view of the mesh and everything that writes it
//! somewhere else.
//!
//! ## Components
//!
//! - **registry**: concurrent `Nodes` map with merge, select, link derivation and the state file
//! - **globals**: per site/domain aggregation over one registry snapshot
//! - **sink**: the `Connection` trait the collector reports to
//! - **storage**: SQLite `Connection` backed by sqlx
//! - **worker**: periodic expiry and state file saving
//! - **error**: State-specific error types
//!
//! ## Example
//!
//! ```
//! use meshpulse_core::{NodeId, ResponseData};
//! use meshpulse_state::Nodes;
//!
//! let nodes = Nodes::new();
//! let id = NodeId::new("aabbccddeeff").unwrap();
//! nodes.update(&id, ResponseData::default());
//!
//! assert_eq!(nodes.select(|node| node.online).len(), 1);
//! ```

pub mod error;
pub mod globals;
pub mod registry;
pub mod sink;
pub mod storage;
pub mod worker;

// Re-exports for convenience
pub use error::{Result, StateError};
pub use globals::SiteGlobals;
pub use registry::{ExpireReport, Nodes, NodesView};
pub use sink::Connection;
pub use storage::{GlobalsRow, SqliteStore};
pub use worker::Housekeeping;
