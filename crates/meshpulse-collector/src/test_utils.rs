//! Test utilities for exercising the collector without a real mesh
//!
//! This module provides a loopback [`FakeNode`] that answers requests the way
//! a field node would, a [`RecordingSink`] that keeps everything written to
//! it, and helpers to build compressed payloads.
//!
//! # Example
//!
//! ```rust,ignore
//! use meshpulse_collector::test_utils::FakeNode;
//!
//! #[tokio::test]
//! async fn test_against_fake_node() {
//!     let node = FakeNode::spawn(r#"{"nodeinfo": {"node_id": "aabbccddeeff"}}"#).await.unwrap();
//!     // point the collector's request_port at node.addr().port()
//!     assert_eq!(node.requests(), 0);
//! }
//! ```

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use meshpulse_core::{GlobalStats, InterfaceConfig, Link, Node, REQUEST_COMMAND};
use meshpulse_state::Connection;

/// Compress a payload the way nodes do (raw deflate)
pub fn compress(payload: &[u8]) -> Vec<u8> {
    miniz_oxide::deflate::compress_to_vec(payload, 6)
}

/// Interface config for a listen-only socket on 127.0.0.1
pub fn loopback_interface() -> InterfaceConfig {
    InterfaceConfig {
        ip_address: Some(std::net::IpAddr::from([127, 0, 0, 1])),
        send_no_request: true,
        ..InterfaceConfig::new("lo")
    }
}

/// Poll `check` until it holds or `timeout` elapses
pub async fn wait_for<F>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

/// A node answering respond requests on loopback
pub struct FakeNode {
    addr: SocketAddr,
    requests: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl FakeNode {
    /// Bind to 127.0.0.1 and answer every request with `reply`
    pub async fn spawn(reply: &str) -> std::io::Result<Self> {
        let socket = UdpSocket::bind("127.0.0.1:0").await?;
        let addr = socket.local_addr()?;
        let requests = Arc::new(AtomicUsize::new(0));
        let payload = compress(reply.as_bytes());

        let counter = requests.clone();
        let task = tokio::spawn(async move {
            let mut buf = [0u8; 1500];
            while let Ok((len, from)) = socket.recv_from(&mut buf).await {
                if &buf[..len] != REQUEST_COMMAND {
                    trace!(from = %from, "Ignoring unknown request");
                    continue;
                }
                counter.fetch_add(1, Ordering::SeqCst);
                if let Err(e) = socket.send_to(&payload, from).await {
                    debug!(error = %e, "Fake node reply failed");
                }
            }
        });

        Ok(Self {
            addr,
            requests,
            task,
        })
    }

    /// Address the node listens on
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Requests received so far
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl Drop for FakeNode {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// A [`Connection`] that keeps everything written to it
#[derive(Default)]
pub struct RecordingSink {
    nodes: Mutex<Vec<Node>>,
    links: Mutex<Vec<(Link, DateTime<Utc>)>>,
    globals: Mutex<Vec<(GlobalStats, DateTime<Utc>, String, String)>>,
}

impl RecordingSink {
    /// Nodes written so far
    pub fn nodes(&self) -> Vec<Node> {
        self.nodes.lock().clone()
    }

    /// Links written so far
    pub fn links(&self) -> Vec<Link> {
        self.links.lock().iter().map(|(link, _)| link.clone()).collect()
    }

    /// Observation times of the links written so far
    pub fn link_times(&self) -> Vec<DateTime<Utc>> {
        self.links.lock().iter().map(|(_, time)| *time).collect()
    }

    /// Aggregates written so far as (stats, site, domain)
    pub fn globals(&self) -> Vec<(GlobalStats, String, String)> {
        self.globals
            .lock()
            .iter()
            .map(|(stats, _, site, domain)| (stats.clone(), site.clone(), domain.clone()))
            .collect()
    }
}

impl Connection for RecordingSink {
    fn insert_node(&self, node: &Node) {
        self.nodes.lock().push(node.clone());
    }

    fn insert_link(&self, link: &Link, time: DateTime<Utc>) {
        self.links.lock().push((link.clone(), time));
    }

    fn insert_globals(&self, stats: &GlobalStats, time: DateTime<Utc>, site: &str, domain: &str) {
        self.globals
            .lock()
            .push((stats.clone(), time, site.to_string(), domain.to_string()));
    }
}
