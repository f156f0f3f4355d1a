//! Decoded respond payloads
//!
//! A respond reply is a JSON object with up to three optional sections. Each
//! section names the node it describes through its own `node_id` field, so a
//! reply assembled from mismatched sections can be detected and trimmed.
//!
//! Every field defaults when absent or `null`, and zero-valued fields are
//! omitted again on serialization, so a payload survives decode and re-encode
//! unchanged.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

use crate::location::Location;

/// Literal request sent to nodes, unicast or multicast
pub const REQUEST_COMMAND: &[u8] = b"GET nodeinfo statistics neighbours";

fn is_default<T: Default + PartialEq>(value: &T) -> bool {
    *value == T::default()
}

/// Read an explicit `null` as the field's zero value
pub(crate) fn null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// One decoded respond reply
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseData {
    /// Identity and configuration of the node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodeinfo: Option<NodeInfo>,
    /// Runtime counters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<Statistics>,
    /// Adjacency information
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub neighbours: Option<Neighbours>,
}

impl ResponseData {
    /// The identifier this reply claims to describe.
    ///
    /// Checked in priority order: nodeinfo, neighbours, statistics.
    pub fn candidate_node_id(&self) -> Option<&str> {
        if let Some(nodeinfo) = &self.nodeinfo {
            Some(nodeinfo.node_id.as_str())
        } else if let Some(neighbours) = &self.neighbours {
            Some(neighbours.node_id.as_str())
        } else {
            self.statistics.as_ref().map(|s| s.node_id.as_str())
        }
    }

    /// Drop every fragment whose own identifier differs from `node_id`.
    ///
    /// Returns the names of the dropped fragments.
    pub fn retain_node(&mut self, node_id: &str) -> Vec<&'static str> {
        let mut dropped = Vec::new();
        if self.statistics.as_ref().is_some_and(|s| s.node_id != node_id) {
            self.statistics = None;
            dropped.push("statistics");
        }
        if self.neighbours.as_ref().is_some_and(|n| n.node_id != node_id) {
            self.neighbours = None;
            dropped.push("neighbours");
        }
        if self.nodeinfo.as_ref().is_some_and(|n| n.node_id != node_id) {
            self.nodeinfo = None;
            dropped.push("nodeinfo");
        }
        dropped
    }

    /// Check whether no fragment is present
    pub fn is_empty(&self) -> bool {
        self.nodeinfo.is_none() && self.statistics.is_none() && self.neighbours.is_none()
    }
}

// ============================================================================
// nodeinfo
// ============================================================================

/// Self-reported identity of a node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeInfo {
    /// Node identifier (12 hex characters)
    #[serde(deserialize_with = "null_default")]
    pub node_id: String,
    /// Network configuration
    #[serde(deserialize_with = "null_default")]
    pub network: Network,
    /// Owner contact, if published
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<Owner>,
    /// Site and domain membership
    #[serde(deserialize_with = "null_default")]
    pub system: System,
    /// Hostname
    #[serde(deserialize_with = "null_default")]
    pub hostname: String,
    /// Geographic position, if published
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    /// Software versions
    #[serde(deserialize_with = "null_default")]
    pub software: Software,
    /// Hardware description
    #[serde(deserialize_with = "null_default")]
    pub hardware: Hardware,
    /// Whether the node acts as a VPN gateway
    #[serde(deserialize_with = "null_default")]
    pub vpn: bool,
    /// Radio settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wireless: Option<Wireless>,
}

impl NodeInfo {
    /// All MAC addresses the node reports for itself and its mesh interfaces
    pub fn interface_macs(&self) -> impl Iterator<Item = &str> {
        let primary = (!self.network.mac.is_empty()).then_some(self.network.mac.as_str());
        let mesh = self.network.mesh.values().flat_map(|bat| {
            bat.interfaces
                .wireless
                .iter()
                .chain(bat.interfaces.other.iter())
                .chain(bat.interfaces.tunnel.iter())
                .map(String::as_str)
        });
        primary
            .into_iter()
            .chain(mesh)
            .chain(self.network.mesh_interfaces.iter().map(String::as_str))
    }
}

/// Owner contact information
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Owner {
    /// Free-form contact string
    #[serde(deserialize_with = "null_default")]
    pub contact: String,
}

/// Administrative grouping of a node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct System {
    /// Site code
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "null_default")]
    pub site_code: String,
    /// Domain code within the site
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "null_default")]
    pub domain_code: String,
}

/// Network configuration of a node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Network {
    /// Primary MAC address
    #[serde(deserialize_with = "null_default")]
    pub mac: String,
    /// Configured IP addresses
    #[serde(skip_serializing_if = "Vec::is_empty", deserialize_with = "null_default")]
    pub addresses: Vec<String>,
    /// Mesh interfaces grouped by batman-adv interface
    #[serde(skip_serializing_if = "BTreeMap::is_empty", deserialize_with = "null_default")]
    pub mesh: BTreeMap<String, BatInterface>,
    /// Legacy flat list of mesh interface MACs
    #[serde(skip_serializing_if = "Vec::is_empty", deserialize_with = "null_default")]
    pub mesh_interfaces: Vec<String>,
}

/// Interfaces attached to one batman-adv instance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatInterface {
    /// Interface MACs by kind
    #[serde(deserialize_with = "null_default")]
    pub interfaces: MeshInterfaces,
}

/// Interface MACs by kind
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshInterfaces {
    /// Wireless mesh interfaces
    #[serde(skip_serializing_if = "Vec::is_empty", deserialize_with = "null_default")]
    pub wireless: Vec<String>,
    /// Wired mesh interfaces
    #[serde(skip_serializing_if = "Vec::is_empty", deserialize_with = "null_default")]
    pub other: Vec<String>,
    /// VPN tunnel interfaces
    #[serde(skip_serializing_if = "Vec::is_empty", deserialize_with = "null_default")]
    pub tunnel: Vec<String>,
}

/// Software versions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Software {
    #[serde(skip_serializing_if = "is_default", deserialize_with = "null_default")]
    pub autoupdater: Autoupdater,
    #[serde(
        rename = "batman-adv",
        skip_serializing_if = "is_default",
        deserialize_with = "null_default"
    )]
    pub batman_adv: BatmanAdv,
    #[serde(skip_serializing_if = "is_default", deserialize_with = "null_default")]
    pub babeld: Babeld,
    #[serde(skip_serializing_if = "is_default", deserialize_with = "null_default")]
    pub fastd: Fastd,
    #[serde(skip_serializing_if = "is_default", deserialize_with = "null_default")]
    pub firmware: Firmware,
    #[serde(
        rename = "status-page",
        skip_serializing_if = "is_default",
        deserialize_with = "null_default"
    )]
    pub status_page: StatusPage,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Autoupdater {
    #[serde(skip_serializing_if = "is_default", deserialize_with = "null_default")]
    pub enabled: bool,
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "null_default")]
    pub branch: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatmanAdv {
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "null_default")]
    pub version: String,
    #[serde(skip_serializing_if = "is_default", deserialize_with = "null_default")]
    pub compat: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Babeld {
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "null_default")]
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Fastd {
    #[serde(skip_serializing_if = "is_default", deserialize_with = "null_default")]
    pub enabled: bool,
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "null_default")]
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Firmware {
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "null_default")]
    pub base: String,
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "null_default")]
    pub release: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusPage {
    #[serde(deserialize_with = "null_default")]
    pub api: i32,
}

/// Hardware description
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hardware {
    /// Number of CPU cores
    #[serde(deserialize_with = "null_default")]
    pub nproc: u32,
    /// Device model
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "null_default")]
    pub model: String,
}

/// Radio settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Wireless {
    #[serde(skip_serializing_if = "is_default", deserialize_with = "null_default")]
    pub txpower24: u32,
    #[serde(skip_serializing_if = "is_default", deserialize_with = "null_default")]
    pub channel24: u32,
    #[serde(skip_serializing_if = "is_default", deserialize_with = "null_default")]
    pub txpower5: u32,
    #[serde(skip_serializing_if = "is_default", deserialize_with = "null_default")]
    pub channel5: u32,
}

// ============================================================================
// statistics
// ============================================================================

/// Runtime counters reported by a node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Statistics {
    /// Node identifier (12 hex characters)
    #[serde(deserialize_with = "null_default")]
    pub node_id: String,
    /// Connected clients
    #[serde(deserialize_with = "null_default")]
    pub clients: Clients,
    #[serde(skip_serializing_if = "is_default", deserialize_with = "null_default")]
    pub rootfs_usage: f64,
    #[serde(
        rename = "loadavg",
        skip_serializing_if = "is_default",
        deserialize_with = "null_default"
    )]
    pub load_average: f64,
    #[serde(skip_serializing_if = "is_default", deserialize_with = "null_default")]
    pub memory: Memory,
    #[serde(skip_serializing_if = "is_default", deserialize_with = "null_default")]
    pub uptime: f64,
    #[serde(skip_serializing_if = "is_default", deserialize_with = "null_default")]
    pub idletime: f64,
    /// Selected IPv4 gateway
    #[serde(
        rename = "gateway",
        skip_serializing_if = "String::is_empty",
        deserialize_with = "null_default"
    )]
    pub gateway_ipv4: String,
    /// Selected IPv6 gateway
    #[serde(
        rename = "gateway6",
        skip_serializing_if = "String::is_empty",
        deserialize_with = "null_default"
    )]
    pub gateway_ipv6: String,
    #[serde(skip_serializing_if = "is_default", deserialize_with = "null_default")]
    pub processes: Processes,
    #[serde(skip_serializing_if = "is_default", deserialize_with = "null_default")]
    pub traffic: TrafficStats,
}

/// Connected client counts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Clients {
    #[serde(deserialize_with = "null_default")]
    pub total: u32,
    #[serde(skip_serializing_if = "is_default", deserialize_with = "null_default")]
    pub wifi: u32,
    #[serde(skip_serializing_if = "is_default", deserialize_with = "null_default")]
    pub wifi24: u32,
    #[serde(skip_serializing_if = "is_default", deserialize_with = "null_default")]
    pub wifi5: u32,
    #[serde(skip_serializing_if = "is_default", deserialize_with = "null_default")]
    pub owe: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Memory {
    #[serde(deserialize_with = "null_default")]
    pub cached: u64,
    #[serde(deserialize_with = "null_default")]
    pub total: u64,
    #[serde(deserialize_with = "null_default")]
    pub buffers: u64,
    #[serde(deserialize_with = "null_default")]
    pub free: u64,
    #[serde(skip_serializing_if = "is_default", deserialize_with = "null_default")]
    pub available: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Processes {
    #[serde(deserialize_with = "null_default")]
    pub total: u32,
    #[serde(deserialize_with = "null_default")]
    pub running: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficStats {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx: Option<Traffic>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rx: Option<Traffic>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forward: Option<Traffic>,
    #[serde(rename = "mgmt_tx", skip_serializing_if = "Option::is_none")]
    pub mgmt_tx: Option<Traffic>,
    #[serde(rename = "mgmt_rx", skip_serializing_if = "Option::is_none")]
    pub mgmt_rx: Option<Traffic>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Traffic {
    #[serde(skip_serializing_if = "is_default", deserialize_with = "null_default")]
    pub bytes: f64,
    #[serde(skip_serializing_if = "is_default", deserialize_with = "null_default")]
    pub packets: f64,
    #[serde(skip_serializing_if = "is_default", deserialize_with = "null_default")]
    pub dropped: f64,
}

// ============================================================================
// neighbours
// ============================================================================

/// Adjacency information reported by a node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Neighbours {
    /// Node identifier (12 hex characters)
    #[serde(deserialize_with = "null_default")]
    pub node_id: String,
    /// batman-adv originators, keyed by the local interface MAC
    #[serde(skip_serializing_if = "BTreeMap::is_empty", deserialize_with = "null_default")]
    pub batadv: BTreeMap<String, BatadvNeighbours>,
    /// babel neighbours, keyed by the local interface name
    #[serde(skip_serializing_if = "BTreeMap::is_empty", deserialize_with = "null_default")]
    pub babel: BTreeMap<String, BabelNeighbours>,
    /// LLDP neighbours, keyed by the local interface MAC
    #[serde(skip_serializing_if = "BTreeMap::is_empty", deserialize_with = "null_default")]
    pub lldp: BTreeMap<String, BTreeMap<String, LldpLink>>,
}

/// batman-adv neighbours of one local interface
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatadvNeighbours {
    /// Peer MAC → link metrics
    #[serde(deserialize_with = "null_default")]
    pub neighbours: BTreeMap<String, BatadvLink>,
}

/// batman-adv link metrics (tq in 0..=255)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatadvLink {
    #[serde(deserialize_with = "null_default")]
    pub lastseen: f64,
    #[serde(deserialize_with = "null_default")]
    pub tq: f64,
}

/// babel neighbours of one local interface
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BabelNeighbours {
    /// Link-local address of the local interface
    #[serde(rename = "ll-addr", deserialize_with = "null_default")]
    pub link_local_address: String,
    /// Peer link-local address → link metrics
    #[serde(deserialize_with = "null_default")]
    pub neighbours: BTreeMap<String, BabelLink>,
}

/// babel link metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BabelLink {
    #[serde(deserialize_with = "null_default")]
    pub rxcost: u32,
    #[serde(deserialize_with = "null_default")]
    pub txcost: u32,
    #[serde(deserialize_with = "null_default")]
    pub cost: u32,
}

/// LLDP carries no metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LldpLink {}
