//! Respond protocol collector for the meshpulse mesh monitor
//!
//! This crate interrogates field nodes over UDP and merges their replies into
//! a shared [`meshpulse_state::Nodes`] registry.
//!
//! # Architecture
//!
//! 1. **Interfaces** - one UDP socket per configured network interface
//! 2. **Receivers** - one task per socket feeding a bounded queue
//! 3. **Decoder** - single consumer: inflate, parse, validate, merge
//! 4. **Scheduler** - multicast every interval, unicast to nodes that missed it
//! 5. **Aggregator** - per site/domain statistics handed to the sink
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use meshpulse_collector::Collector;
//! use meshpulse_core::Config;
//! use meshpulse_state::Nodes;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_file("meshpulse.toml")?;
//!     let nodes = Arc::new(Nodes::new());
//!
//!     let mut collector = Collector::new(config.respondd, nodes.clone(), None)?;
//!     let handle = collector.start()?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     handle.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Wire Format
//!
//! Requests are the literal ASCII string `GET nodeinfo statistics neighbours`
//! sent to port 1001. Replies are raw-deflate-compressed JSON documents with
//! optional `nodeinfo`, `statistics` and `neighbours` sections.

#![warn(missing_docs)]

pub mod aggregator;
pub mod collector;
pub mod decoder;
pub mod error;
pub mod interface;
pub mod receiver;
pub mod scheduler;

// Testing utilities
pub mod test_utils;

// Re-exports for convenience
pub use aggregator::Aggregator;
pub use collector::{Collector, CollectorHandle};
pub use decoder::{decode, Decoder};
pub use error::{CollectorError, Result};
pub use interface::Interface;
pub use receiver::{RawDatagram, READ_BUFFER_SIZE};
pub use scheduler::{Scheduler, UNICAST_PAUSE, UNICAST_WINDOW};
