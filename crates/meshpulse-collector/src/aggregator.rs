//! Global statistics aggregator
//!
//! On its own timer, computes one aggregate per configured site/domain pair
//! from a single registry snapshot and hands each to the sink.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use meshpulse_state::{globals, Connection, Nodes, SiteGlobals};

/// Periodic per site/domain aggregation
pub struct Aggregator {
    nodes: Arc<Nodes>,
    sink: Arc<dyn Connection>,
    sites_domains: BTreeMap<String, Vec<String>>,
    interval: Duration,
}

impl Aggregator {
    /// Create an aggregator writing to `sink`
    pub fn new(
        nodes: Arc<Nodes>,
        sink: Arc<dyn Connection>,
        sites_domains: BTreeMap<String, Vec<String>>,
        interval: Duration,
    ) -> Self {
        Self {
            nodes,
            sink,
            sites_domains,
            interval,
        }
    }

    /// Compute and store the aggregates as of `now`
    pub fn run_once(&self, now: DateTime<Utc>) -> Vec<SiteGlobals> {
        let result = globals::compute(&self.nodes.read(), &self.sites_domains);
        for entry in &result {
            self.sink
                .insert_globals(&entry.stats, now, &entry.site, &entry.domain);
            debug!(
                site = %entry.site,
                domain = %entry.domain,
                nodes = entry.stats.nodes,
                clients = entry.stats.clients,
                "Global stats stored"
            );
        }
        result
    }

    /// Aggregate every interval until shutdown; the first run is one interval in
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + self.interval;
            let mut ticker = tokio::time::interval_at(start, self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            info!(interval = ?self.interval, pairs = self.sites_domains.values().map(Vec::len).sum::<usize>(), "Aggregator started");
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.run_once(Utc::now());
                    }
                    _ = shutdown.changed() => break,
                }
            }
            debug!("Aggregator stopped");
        })
    }
}
