//! Drop nodes by identifier

use std::collections::HashSet;

use meshpulse_core::Node;

use super::{expect_strings, Filter};
use crate::error::Result;

/// Drops nodes whose nodeinfo id is listed
#[derive(Debug, Clone)]
pub struct Blocklist {
    ids: HashSet<String>,
}

impl Blocklist {
    /// Build from an array of node ids
    pub fn build(value: &toml::Value) -> Result<Box<dyn Filter>> {
        Ok(Box::new(Self {
            ids: expect_strings("blocklist", value)?.into_iter().collect(),
        }))
    }
}

impl Filter for Blocklist {
    fn apply(&self, node: Node) -> Option<Node> {
        match &node.nodeinfo {
            Some(info) if self.ids.contains(&info.node_id) => None,
            _ => Some(node),
        }
    }
}
