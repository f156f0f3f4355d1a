//! Node identity and aggregate node state
//!
//! The registry owns one [`Node`] per identifier and merges every accepted
//! reply into it. [`Link`]s are never stored; they are derived from a node's
//! neighbours on demand.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::data::{Neighbours, NodeInfo, Statistics};
use crate::error::{CoreError, Result};

/// Required length of a node identifier
pub const NODE_ID_LEN: usize = 12;

/// Unique identifier for a node in the mesh.
///
/// Conventionally the primary MAC address as 12 lowercase hex characters.
/// Only the length is validated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Validate and wrap an identifier
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        // node ids are ASCII hex, so byte length is the character count
        if id.len() != NODE_ID_LEN {
            let got = id.chars().count();
            return Err(CoreError::InvalidNodeId {
                id,
                expected: NODE_ID_LEN,
                got,
            });
        }
        Ok(Self(id))
    }

    /// Get the node ID as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for NodeId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Aggregate state of one node as seen by the collector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Last known address the node replied from
    #[serde(skip)]
    pub address: Option<SocketAddr>,
    /// When the node was first merged into the registry
    pub firstseen: DateTime<Utc>,
    /// When the node last replied
    pub lastseen: DateTime<Utc>,
    /// Whether the node replied within the staleness threshold
    pub online: bool,
    /// Latest statistics fragment
    #[serde(default)]
    pub statistics: Option<Statistics>,
    /// Latest nodeinfo fragment
    #[serde(default)]
    pub nodeinfo: Option<NodeInfo>,
    /// Latest neighbours fragment
    #[serde(default)]
    pub neighbours: Option<Neighbours>,
}

impl Node {
    /// Create an empty node first seen at `now`
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            address: None,
            firstseen: now,
            lastseen: now,
            online: true,
            statistics: None,
            nodeinfo: None,
            neighbours: None,
        }
    }

    /// Whether the node announces itself as a VPN gateway
    pub fn is_gateway(&self) -> bool {
        self.nodeinfo.as_ref().is_some_and(|info| info.vpn)
    }

    /// Total clients, zero when offline or without statistics
    pub fn clients(&self) -> u32 {
        match &self.statistics {
            Some(statistics) if self.online => statistics.clients.total,
            _ => 0,
        }
    }

    /// Site and domain codes from nodeinfo, if any
    pub fn site_domain(&self) -> Option<(&str, &str)> {
        self.nodeinfo
            .as_ref()
            .map(|info| (info.system.site_code.as_str(), info.system.domain_code.as_str()))
    }

    /// Time elapsed since the last reply
    pub fn time_since_seen(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.lastseen)
    }
}

/// Directed adjacency between two nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    /// Reporting node
    pub source_id: String,
    /// Local interface address on the reporting node
    pub source_address: String,
    /// Peer node
    pub target_id: String,
    /// Peer interface address
    pub target_address: String,
    /// Link quality in 0.0..=1.0
    pub tq: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_length() {
        assert!(NodeId::new("aabbccddeeff").is_ok());
        assert!(NodeId::new("aabbccddeef").is_err());
        assert!(NodeId::new("aabbccddeeff0").is_err());
        assert!(NodeId::new("").is_err());
    }

    #[test]
    fn test_node_id_serde_transparent() {
        let id: NodeId = "aabbccddeeff".parse().unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"aabbccddeeff\"");
    }

    #[test]
    fn test_clients_only_when_online() {
        let mut node = Node::new(Utc::now());
        node.statistics = Some(Statistics {
            node_id: "aabbccddeeff".to_string(),
            ..Default::default()
        });
        node.statistics.as_mut().unwrap().clients.total = 4;
        assert_eq!(node.clients(), 4);

        node.online = false;
        assert_eq!(node.clients(), 0);
    }

    #[test]
    fn test_address_not_serialized() {
        let mut node = Node::new(Utc::now());
        node.address = Some("[fe80::1]:1001".parse().unwrap());
        let json = serde_json::to_string(&node).unwrap();
        assert!(!json.contains("fe80"));
    }
}
