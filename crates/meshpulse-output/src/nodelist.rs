//! `nodelist` output: the compact list consumed by map frontends

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

use meshpulse_core::Node;

use crate::error::Result;
use crate::output::{expect_path, save_json, Output};

/// Format version written to `version`
pub const NODELIST_VERSION: &str = "1.0.1";

/// Rendered document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeList {
    /// Format version
    pub version: String,
    /// Generation time
    pub updated_at: DateTime<Utc>,
    /// Nodes with nodeinfo
    pub nodes: Vec<NodelistEntry>,
}

/// One node in the list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodelistEntry {
    /// Node identifier
    pub id: String,
    /// Hostname
    pub name: String,
    /// Published position
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    /// Reachability
    pub status: Status,
}

/// Published position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Latitude in degrees
    pub lat: f64,
    /// Longitude in degrees
    pub long: f64,
}

/// Reachability of a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    /// Whether the node is online
    pub online: bool,
    /// Last reply
    pub lastcontact: DateTime<Utc>,
    /// Clients, zero when offline
    pub clients: u32,
}

impl NodelistEntry {
    /// Nodes without nodeinfo have no name or id and are skipped
    pub fn from_node(node: &Node) -> Option<Self> {
        let info = node.nodeinfo.as_ref()?;
        Some(Self {
            id: info.node_id.clone(),
            name: info.hostname.clone(),
            position: info.location.as_ref().map(|location| Position {
                lat: location.latitude,
                long: location.longitude,
            }),
            status: Status {
                online: node.online,
                lastcontact: node.lastseen,
                clients: node.clients(),
            },
        })
    }
}

/// Build the document for `nodes`
pub fn transform(nodes: &[Node], now: DateTime<Utc>) -> NodeList {
    NodeList {
        version: NODELIST_VERSION.to_string(),
        updated_at: now,
        nodes: nodes.iter().filter_map(NodelistEntry::from_node).collect(),
    }
}

/// Writes [`NodeList`] documents to `path`
#[derive(Debug, Clone)]
pub struct NodelistOutput {
    path: PathBuf,
}

impl NodelistOutput {
    /// Build from a table with `path`
    pub fn build(config: &toml::Value) -> Result<Box<dyn Output>> {
        Ok(Box::new(Self {
            path: expect_path("nodelist", config)?,
        }))
    }
}

impl Output for NodelistOutput {
    fn save(&self, nodes: &[Node]) -> Result<()> {
        let list = transform(nodes, Utc::now());
        save_json(&list, &self.path)?;
        debug!(path = %self.path.display(), nodes = list.nodes.len(), "Nodelist written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshpulse_core::data::Statistics;
    use meshpulse_core::{Location, NodeInfo};

    fn node(online: bool) -> Node {
        let mut node = Node::new(Utc::now());
        node.online = online;
        node.nodeinfo = Some(NodeInfo {
            node_id: "aabbccddeeff".to_string(),
            hostname: "gw01".to_string(),
            location: Some(Location::new(53.07, 8.80)),
            ..Default::default()
        });
        let mut statistics = Statistics::default();
        statistics.clients.total = 12;
        node.statistics = Some(statistics);
        node
    }

    #[test]
    fn test_transform() {
        let now = Utc::now();
        let list = transform(&[node(true), Node::new(now)], now);

        assert_eq!(list.version, "1.0.1");
        assert_eq!(list.nodes.len(), 1);

        let entry = &list.nodes[0];
        assert_eq!(entry.id, "aabbccddeeff");
        assert_eq!(entry.name, "gw01");
        assert_eq!(entry.position, Some(Position { lat: 53.07, long: 8.80 }));
        assert!(entry.status.online);
        assert_eq!(entry.status.clients, 12);
    }

    #[test]
    fn test_offline_node_has_no_clients() {
        let entry = NodelistEntry::from_node(&node(false)).unwrap();
        assert!(!entry.status.online);
        assert_eq!(entry.status.clients, 0);
    }

    #[test]
    fn test_json_shape() {
        let mut unlocated = node(true);
        unlocated.nodeinfo.as_mut().unwrap().location = None;
        let json = serde_json::to_value(transform(&[unlocated], Utc::now())).unwrap();

        assert!(json["updated_at"].is_string());
        let entry = &json["nodes"][0];
        assert!(entry.get("position").is_none());
        assert_eq!(entry["status"]["clients"], 12);
    }

    #[test]
    fn test_save_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nodelist.json");
        let config: toml::Value =
            toml::from_str(&format!("path = {:?}", path.display().to_string())).unwrap();

        let output = NodelistOutput::build(&config).unwrap();
        output.save(&[node(true)]).unwrap();

        let list: NodeList = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(list.nodes.len(), 1);
        assert!(!path.with_extension("tmp").exists());
    }
}
