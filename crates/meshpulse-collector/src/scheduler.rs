//! Request scheduler
//!
//! Every collection interval T the scheduler multicasts a request on each
//! sending interface, waits T/2 for the replies to be merged, then unicasts
//! to nodes that were seen within the last ten minutes but not since the
//! multicast went out.

use chrono::{DateTime, Utc};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use meshpulse_core::Node;
use meshpulse_state::Nodes;

use crate::interface::Interface;

/// Nodes silent for longer than this are not asked individually
pub const UNICAST_WINDOW: Duration = Duration::from_secs(10 * 60);

/// Pause after each node that was sent a unicast request
pub const UNICAST_PAUSE: Duration = Duration::from_millis(10);

/// Drives the multicast then unicast request cycle
#[derive(Clone)]
pub struct Scheduler {
    interfaces: Arc<Vec<Interface>>,
    nodes: Arc<Nodes>,
    interval: Duration,
    request_port: u16,
    synchronize: Option<Duration>,
}

impl Scheduler {
    /// Create a scheduler over already opened interfaces
    pub fn new(
        interfaces: Arc<Vec<Interface>>,
        nodes: Arc<Nodes>,
        interval: Duration,
        request_port: u16,
        synchronize: Option<Duration>,
    ) -> Self {
        Self {
            interfaces,
            nodes,
            interval,
            request_port,
            synchronize,
        }
    }

    /// Multicast a request on every sending interface, returns the number sent
    pub async fn send_multicast(&self) -> usize {
        let mut sent = 0;
        for iface in self.interfaces.iter().filter(|iface| iface.send_request) {
            match iface.send_request(iface.multicast_group, self.request_port).await {
                Ok(()) => sent += 1,
                Err(e) => warn!(ifname = %iface.ifname, error = %e, "Multicast request failed"),
            }
        }
        debug!(sent, "Multicast requests sent");
        sent
    }

    /// Nodes seen in the ten minutes before `seen_before` with a known address
    pub fn unicast_targets(&self, seen_before: DateTime<Utc>) -> Vec<Node> {
        let window = chrono::Duration::from_std(UNICAST_WINDOW).unwrap_or_default();
        let seen_after = seen_before - window;
        self.nodes.select(|node| {
            node.lastseen > seen_after && node.lastseen < seen_before && node.address.is_some()
        })
    }

    /// Unicast a request to every node that missed the multicast.
    ///
    /// Returns the number of requests sent.
    pub async fn send_unicast(&self, seen_before: DateTime<Utc>) -> usize {
        let targets = self.unicast_targets(seen_before);
        let mut count = 0;

        for node in &targets {
            let Some(addr) = node.address else { continue };
            let mut sent = 0;
            for iface in self.interfaces.iter().filter(|iface| iface.matches(&addr)) {
                match iface.send_request(addr.ip(), self.request_port).await {
                    Ok(()) => sent += 1,
                    Err(e) => warn!(
                        ifname = %iface.ifname,
                        address = %addr,
                        error = %e,
                        "Unicast request failed"
                    ),
                }
            }

            if sent == 0 {
                warn!(address = %addr, "Unable to find an interface for node");
            } else {
                tokio::time::sleep(UNICAST_PAUSE).await;
                count += sent;
            }
        }

        info!(requests = count, nodes = targets.len(), "Unicast requests sent");
        count
    }

    /// One multicast, settle, unicast round.
    ///
    /// Returns false if shutdown was signalled while settling.
    pub async fn run_cycle(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        let seen_before = Utc::now();
        self.send_multicast().await;

        tokio::select! {
            _ = tokio::time::sleep(self.interval / 2) => {}
            _ = shutdown.changed() => return false,
        }

        self.send_unicast(seen_before).await;
        true
    }

    /// Send a request to `ip` on the interface at `index`
    pub async fn send_request_via(&self, index: usize, ip: IpAddr) -> crate::Result<()> {
        let iface = self
            .interfaces
            .get(index)
            .ok_or(crate::CollectorError::NoSuchInterface(index))?;
        iface.send_request(ip, self.request_port).await
    }

    /// Run cycles every interval until shutdown
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Some(sync) = self.synchronize {
                let delay = delay_until_multiple(Utc::now(), sync);
                debug!(delay = ?delay, "Delaying first collection");
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.changed() => return,
                }
            }

            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if !self.run_cycle(&mut shutdown).await {
                            break;
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
            debug!("Scheduler stopped");
        })
    }
}

/// Time from `now` until the wall clock reaches the next multiple of `period`
pub fn delay_until_multiple(now: DateTime<Utc>, period: Duration) -> Duration {
    let period_ms = period.as_millis() as i64;
    if period_ms <= 0 {
        return Duration::ZERO;
    }
    let into_period = now.timestamp_millis().rem_euclid(period_ms);
    if into_period == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis((period_ms - into_period) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::loopback_interface;
    use meshpulse_core::{NodeId, ResponseData};

    #[test]
    fn test_delay_until_multiple() {
        let at = |ms: i64| DateTime::from_timestamp_millis(ms).unwrap();
        let minute = Duration::from_secs(60);

        assert_eq!(delay_until_multiple(at(120_000), minute), Duration::ZERO);
        assert_eq!(delay_until_multiple(at(125_000), minute), Duration::from_secs(55));
        assert_eq!(delay_until_multiple(at(179_999), minute), Duration::from_millis(1));
    }

    #[tokio::test]
    async fn test_unicast_targets_window() {
        let nodes = Arc::new(Nodes::new());
        let iface = Interface::open(&loopback_interface()).unwrap();
        let scheduler = Scheduler::new(
            Arc::new(vec![iface]),
            nodes.clone(),
            Duration::from_secs(60),
            1001,
            None,
        );

        let now = Utc::now();
        let addr: std::net::SocketAddr = "127.0.0.1:1001".parse().unwrap();
        let update = |id: &str, ago: i64, addr| {
            nodes.update_at(
                &NodeId::new(id).unwrap(),
                ResponseData::default(),
                addr,
                now - chrono::Duration::minutes(ago),
            );
        };
        update("000000000005", 5, Some(addr));
        update("000000000015", 15, Some(addr));
        update("00000000000a", 5, None);
        update("000000000000", 0, Some(addr));

        let targets = scheduler.unicast_targets(now);
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].lastseen, now - chrono::Duration::minutes(5));
    }

    #[tokio::test]
    async fn test_no_multicast_on_listen_only_interface() {
        let iface = Interface::open(&loopback_interface()).unwrap();
        let scheduler = Scheduler::new(
            Arc::new(vec![iface]),
            Arc::new(Nodes::new()),
            Duration::from_secs(60),
            1001,
            None,
        );
        assert_eq!(scheduler.send_multicast().await, 0);
    }

    #[tokio::test]
    async fn test_send_request_via_unknown_index() {
        let scheduler = Scheduler::new(
            Arc::new(Vec::new()),
            Arc::new(Nodes::new()),
            Duration::from_secs(60),
            1001,
            None,
        );
        let err = scheduler
            .send_request_via(3, "127.0.0.1".parse().unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "NO_SUCH_INTERFACE");
    }
}
