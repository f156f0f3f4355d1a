//! Meshpulse Output - Filterable renderers for registry snapshots
//!
//! Outputs are configured under `nodes.output.<type>` as arrays of tables.
//! Every entry may disable itself with `enable = false` and may carry a
//! `filter` table run over a private copy of the snapshot before rendering.
//!
//! ## Outputs
//!
//! - **nodelist**: compact id/name/position/status list (`version` 1.0.1)
//! - **raw**: every node record as held by the registry
//!
//! ## Filters
//!
//! `no_owner`, `blocklist`, `sites`, `in_area`, `has_location`
//!
//! ## Example
//!
//! ```
//! use std::collections::BTreeMap;
//! use meshpulse_output::OutputSet;
//!
//! let outputs = OutputSet::from_config(&BTreeMap::new()).unwrap();
//! assert!(outputs.is_empty());
//! ```

pub mod error;
pub mod filter;
pub mod nodelist;
pub mod output;
pub mod raw;
pub mod worker;

// Re-exports for convenience
pub use error::{OutputError, Result};
pub use filter::{Filter, FilterSet};
pub use nodelist::{NodeList, NodelistOutput};
pub use output::{save_json, Output, OutputSet};
pub use raw::{RawDump, RawOutput};
pub use worker::OutputWorker;
