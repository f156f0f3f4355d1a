//! Strip owner contact details

use meshpulse_core::Node;

use super::{expect_bool, Filter};
use crate::error::Result;

/// Removes `nodeinfo.owner` when enabled
#[derive(Debug, Clone, Copy)]
pub struct NoOwner {
    enabled: bool,
}

impl NoOwner {
    /// Build from a boolean
    pub fn build(value: &toml::Value) -> Result<Box<dyn Filter>> {
        Ok(Box::new(Self {
            enabled: expect_bool("no_owner", value)?,
        }))
    }
}

impl Filter for NoOwner {
    fn apply(&self, mut node: Node) -> Option<Node> {
        if self.enabled {
            if let Some(info) = node.nodeinfo.as_mut() {
                info.owner = None;
            }
        }
        Some(node)
    }
}
