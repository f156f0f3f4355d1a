//! Concurrent node registry
//!
//! [`Nodes`] keeps one aggregate [`Node`] per identifier and merges every
//! accepted reply into it. A single read-write lock guards both the node map
//! and the interface index used to resolve link targets, so a writer never
//! leaves the two out of step.
//!
//! Links are derived on demand through a [`NodesView`] read guard: the node
//! and every peer it points at come from the same snapshot.

use chrono::{DateTime, Utc};
use parking_lot::{RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, trace};

use meshpulse_core::{Link, Node, NodeId, NodeInfo, ResponseData};

use crate::error::Result;

/// Babel advertises its cost relative to this value; 256 is a perfect link
const BABEL_COST_PERFECT: f32 = 256.0;

/// batman-adv transmit quality ceiling
const BATADV_TQ_MAX: f32 = 255.0;

#[derive(Debug, Default)]
struct Inner {
    list: HashMap<NodeId, Node>,
    /// Interface MAC or address → owning node
    ifaces: HashMap<String, NodeId>,
}

impl Inner {
    fn index(&mut self, id: &NodeId, info: &NodeInfo) {
        for mac in info.interface_macs() {
            self.ifaces.insert(mac.to_string(), id.clone());
        }
        for address in &info.network.addresses {
            self.ifaces.insert(address.clone(), id.clone());
        }
    }

    /// Drop the entries `info` added, unless another node has claimed them since
    fn unindex(&mut self, id: &NodeId, info: &NodeInfo) {
        let keys = info
            .interface_macs()
            .chain(info.network.addresses.iter().map(String::as_str));
        for key in keys {
            if self.ifaces.get(key) == Some(id) {
                self.ifaces.remove(key);
            }
        }
    }

    fn rebuild_index(&mut self) {
        self.ifaces.clear();
        let entries: Vec<(NodeId, NodeInfo)> = self
            .list
            .iter()
            .filter_map(|(id, node)| node.nodeinfo.clone().map(|info| (id.clone(), info)))
            .collect();
        for (id, info) in &entries {
            self.index(id, info);
        }
    }
}

/// Outcome of one expiry sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpireReport {
    /// Nodes that just went offline
    pub offline: usize,
    /// Nodes removed from the registry
    pub pruned: usize,
}

/// On-disk layout of the state file
#[derive(Debug, Serialize, Deserialize)]
struct StateFile {
    timestamp: DateTime<Utc>,
    nodes: BTreeMap<NodeId, Node>,
}

/// Concurrent map of node identifier → aggregate node state
#[derive(Debug, Default)]
pub struct Nodes {
    inner: RwLock<Inner>,
}

impl Nodes {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a reply received now, without a sender address
    pub fn update(&self, id: &NodeId, data: ResponseData) -> Node {
        self.update_at(id, data, None, Utc::now())
    }

    /// Merge a reply received now from `addr`
    pub fn update_from(&self, id: &NodeId, data: ResponseData, addr: SocketAddr) -> Node {
        self.update_at(id, data, Some(addr), Utc::now())
    }

    /// Merge a reply observed at `now`.
    ///
    /// Creates the node on first sight. Each present fragment replaces the
    /// stored one, absent fragments are kept. `lastseen` only moves forward.
    /// Returns a copy of the merged node.
    pub fn update_at(
        &self,
        id: &NodeId,
        data: ResponseData,
        addr: Option<SocketAddr>,
        now: DateTime<Utc>,
    ) -> Node {
        let mut inner = self.inner.write();

        let node = inner.list.entry(id.clone()).or_insert_with(|| {
            debug!(node_id = %id, "New node");
            Node::new(now)
        });

        if now > node.lastseen {
            node.lastseen = now;
        }
        node.online = true;
        if addr.is_some() {
            node.address = addr;
        }

        let ResponseData {
            nodeinfo,
            statistics,
            neighbours,
        } = data;
        if statistics.is_some() {
            node.statistics = statistics;
        }
        if neighbours.is_some() {
            node.neighbours = neighbours;
        }
        let indexed = nodeinfo.clone();
        let previous = match nodeinfo {
            Some(info) => node.nodeinfo.replace(info),
            None => None,
        };

        let merged = node.clone();
        if let Some(info) = previous {
            inner.unindex(id, &info);
        }
        if let Some(info) = indexed {
            inner.index(id, &info);
        }

        trace!(node_id = %id, lastseen = %merged.lastseen, "Node updated");
        merged
    }

    /// Get a copy of one node
    pub fn get(&self, id: &NodeId) -> Option<Node> {
        self.inner.read().list.get(id).cloned()
    }

    /// Number of known nodes
    pub fn len(&self) -> usize {
        self.inner.read().list.len()
    }

    /// Check whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.inner.read().list.is_empty()
    }

    /// Copies of every node matching `pred`, scanned under one read lock
    pub fn select<F>(&self, pred: F) -> Vec<Node>
    where
        F: Fn(&Node) -> bool,
    {
        self.inner
            .read()
            .list
            .values()
            .filter(|node| pred(node))
            .cloned()
            .collect()
    }

    /// Hold the read lock for a consistent multi-step read
    pub fn read(&self) -> NodesView<'_> {
        NodesView {
            inner: self.inner.read(),
        }
    }

    /// Links of one node, derived under a fresh read guard
    pub fn links(&self, id: &NodeId) -> Vec<Link> {
        let view = self.read();
        match view.get(id) {
            Some(node) => view.links(node),
            None => Vec::new(),
        }
    }

    /// Mark stale nodes offline and drop long-dead ones
    pub fn expire(
        &self,
        now: DateTime<Utc>,
        offline_after: Duration,
        prune_after: Duration,
    ) -> ExpireReport {
        let offline_after = to_chrono(offline_after);
        let prune_after = to_chrono(prune_after);
        let mut report = ExpireReport::default();

        let mut inner = self.inner.write();
        let before = inner.list.len();
        inner
            .list
            .retain(|_, node| node.time_since_seen(now) <= prune_after);
        report.pruned = before - inner.list.len();

        for (id, node) in inner.list.iter_mut() {
            if node.online && node.time_since_seen(now) > offline_after {
                debug!(node_id = %id, lastseen = %node.lastseen, "Node went offline");
                node.online = false;
                report.offline += 1;
            }
        }

        if report.pruned > 0 {
            inner.rebuild_index();
        }
        report
    }

    /// Write the registry to `path` as JSON, replacing the file atomically
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let state = {
            let inner = self.inner.read();
            StateFile {
                timestamp: Utc::now(),
                nodes: inner
                    .list
                    .iter()
                    .map(|(id, node)| (id.clone(), node.clone()))
                    .collect(),
            }
        };

        let json = serde_json::to_vec(&state)?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;

        debug!(path = %path.display(), nodes = state.nodes.len(), "State saved");
        Ok(())
    }

    /// Restore a registry from `path`; a missing file yields an empty registry
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No state file, starting empty");
                return Ok(Self::new());
            }
            Err(e) => return Err(e.into()),
        };

        let state: StateFile = serde_json::from_slice(&bytes)?;
        let mut inner = Inner {
            list: state.nodes.into_iter().collect(),
            ifaces: HashMap::new(),
        };
        inner.rebuild_index();

        info!(
            path = %path.display(),
            nodes = inner.list.len(),
            saved_at = %state.timestamp,
            "State loaded"
        );
        Ok(Self {
            inner: RwLock::new(inner),
        })
    }
}

/// Read guard over the registry
pub struct NodesView<'a> {
    inner: RwLockReadGuard<'a, Inner>,
}

impl<'a> NodesView<'a> {
    /// Borrow one node
    pub fn get(&self, id: &NodeId) -> Option<&Node> {
        self.inner.list.get(id)
    }

    /// Iterate over all nodes
    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &Node)> {
        self.inner.list.iter()
    }

    /// Number of nodes in the snapshot
    pub fn len(&self) -> usize {
        self.inner.list.len()
    }

    /// Check whether the snapshot is empty
    pub fn is_empty(&self) -> bool {
        self.inner.list.is_empty()
    }

    /// Node owning an interface MAC or address
    pub fn lookup(&self, iface: &str) -> Option<&NodeId> {
        self.inner.ifaces.get(iface)
    }

    /// Copies of all nodes in the snapshot
    pub fn to_vec(&self) -> Vec<Node> {
        self.inner.list.values().cloned().collect()
    }

    /// Links reported by `node`, with targets resolved against this snapshot.
    ///
    /// Neighbours whose owner is unknown are skipped.
    pub fn links(&self, node: &Node) -> Vec<Link> {
        let Some(neighbours) = &node.neighbours else {
            return Vec::new();
        };
        let source_id = neighbours.node_id.as_str();
        let mut links = Vec::new();

        for (source_mac, batadv) in &neighbours.batadv {
            for (target_mac, link) in &batadv.neighbours {
                let Some(target_id) = self.lookup(target_mac) else {
                    continue;
                };
                links.push(Link {
                    source_id: source_id.to_string(),
                    source_address: source_mac.clone(),
                    target_id: target_id.to_string(),
                    target_address: target_mac.clone(),
                    tq: (link.tq as f32 / BATADV_TQ_MAX).clamp(0.0, 1.0),
                });
            }
        }

        for babel in neighbours.babel.values() {
            for (target_addr, link) in &babel.neighbours {
                let Some(target_id) = self.lookup(target_addr) else {
                    continue;
                };
                links.push(Link {
                    source_id: source_id.to_string(),
                    source_address: babel.link_local_address.clone(),
                    target_id: target_id.to_string(),
                    target_address: target_addr.clone(),
                    tq: babel_quality(link.cost),
                });
            }
        }

        links
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(365 * 100))
}

fn babel_quality(cost: u32) -> f32 {
    if cost == 0 {
        return 1.0;
    }
    (BABEL_COST_PERFECT / cost as f32).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshpulse_core::data::{BabelLink, BabelNeighbours, BatadvLink, BatadvNeighbours};
    use meshpulse_core::{Neighbours, Statistics};

    fn id(s: &str) -> NodeId {
        NodeId::new(s).unwrap()
    }

    fn nodeinfo(node_id: &str, hostname: &str, mac: &str) -> ResponseData {
        let mut info = NodeInfo {
            node_id: node_id.to_string(),
            hostname: hostname.to_string(),
            ..Default::default()
        };
        info.network.mac = mac.to_string();
        ResponseData {
            nodeinfo: Some(info),
            ..Default::default()
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_firstseen_fixed_lastseen_latest() {
        let nodes = Nodes::new();
        let node_id = id("aabbccddeeff");

        nodes.update_at(&node_id, nodeinfo("aabbccddeeff", "a", ""), None, at(0));
        nodes.update_at(&node_id, nodeinfo("aabbccddeeff", "b", ""), None, at(60));
        let node = nodes.get(&node_id).unwrap();

        assert_eq!(node.firstseen, at(0));
        assert_eq!(node.lastseen, at(60));
        assert_eq!(node.nodeinfo.unwrap().hostname, "b");
    }

    #[test]
    fn test_lastseen_never_moves_back() {
        let nodes = Nodes::new();
        let node_id = id("aabbccddeeff");

        nodes.update_at(&node_id, ResponseData::default(), None, at(100));
        let node = nodes.update_at(&node_id, ResponseData::default(), None, at(50));
        assert_eq!(node.lastseen, at(100));
        assert_eq!(node.firstseen, at(100));
    }

    #[test]
    fn test_absent_fragments_kept() {
        let nodes = Nodes::new();
        let node_id = id("aabbccddeeff");

        nodes.update(&node_id, nodeinfo("aabbccddeeff", "gw01", ""));
        let stats = ResponseData {
            statistics: Some(Statistics {
                node_id: "aabbccddeeff".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let node = nodes.update(&node_id, stats);

        assert!(node.nodeinfo.is_some());
        assert!(node.statistics.is_some());
    }

    #[test]
    fn test_address_recorded() {
        let nodes = Nodes::new();
        let node_id = id("aabbccddeeff");
        let addr: SocketAddr = "[fe80::1]:1001".parse().unwrap();

        nodes.update_from(&node_id, ResponseData::default(), addr);
        // an update without sender keeps the last known address
        nodes.update(&node_id, ResponseData::default());
        assert_eq!(nodes.get(&node_id).unwrap().address, Some(addr));
    }

    #[test]
    fn test_select() {
        let nodes = Nodes::new();
        nodes.update_at(&id("000000000001"), ResponseData::default(), None, at(0));
        nodes.update_at(&id("000000000002"), ResponseData::default(), None, at(10));
        nodes.update_at(&id("000000000003"), ResponseData::default(), None, at(20));

        let selected = nodes.select(|node| node.lastseen >= at(10));
        assert_eq!(selected.len(), 2);
        assert!(nodes.select(|_| false).is_empty());
        assert_eq!(nodes.select(|_| true).len(), 3);
    }

    #[test]
    fn test_expire() {
        let nodes = Nodes::new();
        nodes.update_at(&id("000000000001"), ResponseData::default(), None, at(0));
        nodes.update_at(&id("000000000002"), ResponseData::default(), None, at(500));
        nodes.update_at(&id("000000000003"), ResponseData::default(), None, at(1000));

        let report = nodes.expire(
            at(1000),
            Duration::from_secs(120),
            Duration::from_secs(900),
        );

        assert_eq!(report, ExpireReport { offline: 1, pruned: 1 });
        assert!(nodes.get(&id("000000000001")).is_none());
        assert!(!nodes.get(&id("000000000002")).unwrap().online);
        assert!(nodes.get(&id("000000000003")).unwrap().online);

        // a fresh reply brings the node back online
        let node = nodes.update_at(&id("000000000002"), ResponseData::default(), None, at(1010));
        assert!(node.online);
    }

    #[test]
    fn test_batadv_links() {
        let nodes = Nodes::new();
        nodes.update(&id("aabbccddee01"), nodeinfo("aabbccddee01", "a", "aa:bb:cc:dd:ee:01"));
        nodes.update(&id("aabbccddee02"), nodeinfo("aabbccddee02", "b", "aa:bb:cc:dd:ee:02"));

        let mut neighbours = Neighbours {
            node_id: "aabbccddee01".to_string(),
            ..Default::default()
        };
        let mut batadv = BatadvNeighbours::default();
        batadv.neighbours.insert(
            "aa:bb:cc:dd:ee:02".to_string(),
            BatadvLink {
                lastseen: 0.5,
                tq: 255.0,
            },
        );
        batadv.neighbours.insert(
            "ff:ff:ff:ff:ff:ff".to_string(),
            BatadvLink {
                lastseen: 0.5,
                tq: 100.0,
            },
        );
        neighbours.batadv.insert("aa:bb:cc:dd:ee:01".to_string(), batadv);
        nodes.update(
            &id("aabbccddee01"),
            ResponseData {
                neighbours: Some(neighbours),
                ..Default::default()
            },
        );

        let links = nodes.links(&id("aabbccddee01"));
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].target_id, "aabbccddee02");
        assert_eq!(links[0].source_address, "aa:bb:cc:dd:ee:01");
        assert!((links[0].tq - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_changed_nodeinfo_drops_old_interfaces() {
        let nodes = Nodes::new();
        nodes.update(&id("aabbccddee01"), nodeinfo("aabbccddee01", "a", "aa:bb:cc:dd:ee:01"));
        nodes.update(&id("aabbccddee02"), nodeinfo("aabbccddee02", "b", "aa:bb:cc:dd:ee:02"));
        nodes.update(&id("aabbccddee02"), nodeinfo("aabbccddee02", "b", "aa:bb:cc:dd:ee:22"));

        {
            let view = nodes.read();
            assert_eq!(view.lookup("aa:bb:cc:dd:ee:02"), None);
            assert_eq!(view.lookup("aa:bb:cc:dd:ee:22"), Some(&id("aabbccddee02")));
        }

        let mut batadv = BatadvNeighbours::default();
        batadv.neighbours.insert(
            "aa:bb:cc:dd:ee:02".to_string(),
            BatadvLink {
                lastseen: 0.5,
                tq: 255.0,
            },
        );
        let mut neighbours = Neighbours {
            node_id: "aabbccddee01".to_string(),
            ..Default::default()
        };
        neighbours.batadv.insert("aa:bb:cc:dd:ee:01".to_string(), batadv);
        nodes.update(
            &id("aabbccddee01"),
            ResponseData {
                neighbours: Some(neighbours),
                ..Default::default()
            },
        );

        assert!(nodes.links(&id("aabbccddee01")).is_empty());
    }

    #[test]
    fn test_moved_interface_keeps_new_owner() {
        let nodes = Nodes::new();
        nodes.update(&id("aabbccddee01"), nodeinfo("aabbccddee01", "a", "aa:bb:cc:dd:ee:99"));
        nodes.update(&id("aabbccddee02"), nodeinfo("aabbccddee02", "b", "aa:bb:cc:dd:ee:99"));
        nodes.update(&id("aabbccddee01"), nodeinfo("aabbccddee01", "a", "aa:bb:cc:dd:ee:01"));

        let view = nodes.read();
        assert_eq!(view.lookup("aa:bb:cc:dd:ee:99"), Some(&id("aabbccddee02")));
    }

    #[test]
    fn test_babel_links() {
        let nodes = Nodes::new();
        let mut peer = nodeinfo("aabbccddee02", "b", "");
        peer.nodeinfo
            .as_mut()
            .unwrap()
            .network
            .addresses
            .push("fe80::2".to_string());
        nodes.update(&id("aabbccddee02"), peer);

        let mut babel = BabelNeighbours {
            link_local_address: "fe80::1".to_string(),
            ..Default::default()
        };
        babel.neighbours.insert(
            "fe80::2".to_string(),
            BabelLink {
                rxcost: 512,
                txcost: 512,
                cost: 512,
            },
        );
        let mut neighbours = Neighbours {
            node_id: "aabbccddee01".to_string(),
            ..Default::default()
        };
        neighbours.babel.insert("mesh-vpn".to_string(), babel);
        nodes.update(
            &id("aabbccddee01"),
            ResponseData {
                neighbours: Some(neighbours),
                ..Default::default()
            },
        );

        let view = nodes.read();
        let node = view.get(&id("aabbccddee01")).unwrap();
        let links = view.links(node);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].source_address, "fe80::1");
        assert!((links[0].tq - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_babel_quality() {
        assert_eq!(babel_quality(0), 1.0);
        assert_eq!(babel_quality(96), 1.0);
        assert_eq!(babel_quality(1024), 0.25);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let nodes = Nodes::new();
        nodes.update_from(
            &id("aabbccddee01"),
            nodeinfo("aabbccddee01", "gw01", "aa:bb:cc:dd:ee:01"),
            "[fe80::1]:1001".parse().unwrap(),
        );
        nodes.save(&path).unwrap();

        let restored = Nodes::load(&path).unwrap();
        let node = restored.get(&id("aabbccddee01")).unwrap();
        assert_eq!(node.nodeinfo.unwrap().hostname, "gw01");
        assert!(node.address.is_none());
        assert_eq!(
            restored.read().lookup("aa:bb:cc:dd:ee:01"),
            Some(&id("aabbccddee01"))
        );
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let nodes = Nodes::load(dir.path().join("missing.json")).unwrap();
        assert!(nodes.is_empty());
    }
}
