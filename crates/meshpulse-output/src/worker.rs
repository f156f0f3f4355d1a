//! Periodic output rendering

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use meshpulse_state::Nodes;

use crate::output::OutputSet;

/// Renders every configured output once per interval
pub struct OutputWorker {
    nodes: Arc<Nodes>,
    outputs: OutputSet,
    interval: Duration,
}

impl OutputWorker {
    /// Create a worker over `nodes`
    pub fn new(nodes: Arc<Nodes>, outputs: OutputSet, interval: Duration) -> Self {
        Self {
            nodes,
            outputs,
            interval,
        }
    }

    /// Take one snapshot and render every output from it
    pub fn tick(&self) -> usize {
        let snapshot = self.nodes.read().to_vec();
        self.outputs.save_all(&snapshot)
    }

    /// Render every interval until `shutdown` flips to true
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(outputs = self.outputs.len(), interval = ?self.interval, "Output worker started");
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let written = self.tick();
                        debug!(written, "Outputs rendered");
                    }
                    _ = shutdown.changed() => break,
                }
            }
            debug!("Output worker stopped");
        })
    }
}
