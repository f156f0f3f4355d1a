//! Persistence sink seam
//!
//! The collector reports every merged node, every derived link and every
//! global aggregate to a [`Connection`]. Calls are fire-and-forget: an
//! implementation queues the write and reports its own failures.

use chrono::{DateTime, Utc};

use meshpulse_core::{GlobalStats, Link, Node};

/// A time-series store the collector writes to
pub trait Connection: Send + Sync {
    /// Record the current state of a node
    fn insert_node(&self, node: &Node);

    /// Record one derived link observed at `time`
    fn insert_link(&self, link: &Link, time: DateTime<Utc>);

    /// Record the aggregate of one site/domain pair
    fn insert_globals(&self, stats: &GlobalStats, time: DateTime<Utc>, site: &str, domain: &str);
}
