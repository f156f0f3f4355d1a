//! Aggregate counters for one site/domain pair

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::node::Node;

/// Occurrence count per distinct value (firmware release, model, ...)
pub type CounterMap = BTreeMap<String, u32>;

/// Aggregate statistics over the online nodes of one site/domain pair
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalStats {
    /// Online nodes
    pub nodes: u32,
    /// Online nodes acting as gateway
    pub gateways: u32,
    /// Sum of total clients
    pub clients: u32,
    /// Sum of wifi clients
    pub clients_wifi: u32,
    /// Sum of 2.4 GHz clients
    pub clients_wifi24: u32,
    /// Sum of 5 GHz clients
    pub clients_wifi5: u32,
    /// Firmware release counts
    pub firmwares: CounterMap,
    /// Hardware model counts
    pub models: CounterMap,
    /// Autoupdater branch counts ("disabled" when off)
    pub autoupdater: CounterMap,
}

impl GlobalStats {
    /// Account one node. Offline nodes are ignored.
    pub fn add(&mut self, node: &Node) {
        if !node.online {
            return;
        }

        // Counts are node-reported and clamp instead of wrapping
        self.nodes = self.nodes.saturating_add(1);
        if node.is_gateway() {
            self.gateways = self.gateways.saturating_add(1);
        }

        if let Some(statistics) = &node.statistics {
            let clients = &statistics.clients;
            self.clients = self.clients.saturating_add(clients.total);
            self.clients_wifi = self.clients_wifi.saturating_add(clients.wifi);
            self.clients_wifi24 = self.clients_wifi24.saturating_add(clients.wifi24);
            self.clients_wifi5 = self.clients_wifi5.saturating_add(clients.wifi5);
        }

        if let Some(info) = &node.nodeinfo {
            count(&mut self.firmwares, &info.software.firmware.release);
            count(&mut self.models, &info.hardware.model);
            let branch = if info.software.autoupdater.enabled {
                info.software.autoupdater.branch.as_str()
            } else {
                "disabled"
            };
            count(&mut self.autoupdater, branch);
        }
    }
}

fn count(map: &mut CounterMap, key: &str) {
    if !key.is_empty() {
        let entry = map.entry(key.to_string()).or_default();
        *entry = entry.saturating_add(1);
    }
}
