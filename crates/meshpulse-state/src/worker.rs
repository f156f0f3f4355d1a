//! Registry housekeeping
//!
//! Periodically marks silent nodes offline, prunes long-dead ones and saves
//! the state file. A final save runs on shutdown.

use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::Result;
use crate::registry::{ExpireReport, Nodes};

/// Expiry and state file worker
#[derive(Debug, Clone)]
pub struct Housekeeping {
    nodes: Arc<Nodes>,
    state_path: Option<PathBuf>,
    interval: Duration,
    offline_after: Duration,
    prune_after: Duration,
}

impl Housekeeping {
    /// Create a worker over `nodes`
    pub fn new(
        nodes: Arc<Nodes>,
        state_path: Option<PathBuf>,
        interval: Duration,
        offline_after: Duration,
        prune_after: Duration,
    ) -> Self {
        Self {
            nodes,
            state_path,
            interval,
            offline_after,
            prune_after,
        }
    }

    /// Run one sweep and save the state file if configured
    pub fn tick(&self) -> Result<ExpireReport> {
        let report = self
            .nodes
            .expire(Utc::now(), self.offline_after, self.prune_after);
        if report.offline > 0 || report.pruned > 0 {
            info!(
                offline = report.offline,
                pruned = report.pruned,
                total = self.nodes.len(),
                "Expired nodes"
            );
        }
        self.save()?;
        Ok(report)
    }

    fn save(&self) -> Result<()> {
        if let Some(path) = &self.state_path {
            self.nodes.save(path)?;
        }
        Ok(())
    }

    /// Run until `shutdown` flips to true
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.tick() {
                            error!(error = %e, code = e.error_code(), "Housekeeping failed");
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
            if let Err(e) = self.save() {
                error!(error = %e, "Final state save failed");
            }
            debug!("Housekeeping stopped");
        })
    }
}
