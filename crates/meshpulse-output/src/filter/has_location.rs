//! Select nodes by whether they publish a position

use meshpulse_core::Node;

use super::{expect_bool, Filter};
use crate::error::Result;

/// `true` keeps only located nodes, `false` keeps only unlocated ones
#[derive(Debug, Clone, Copy)]
pub struct HasLocation {
    wanted: bool,
}

impl HasLocation {
    /// Build from a boolean
    pub fn build(value: &toml::Value) -> Result<Box<dyn Filter>> {
        Ok(Box::new(Self {
            wanted: expect_bool("has_location", value)?,
        }))
    }
}

impl Filter for HasLocation {
    fn apply(&self, node: Node) -> Option<Node> {
        let located = node
            .nodeinfo
            .as_ref()
            .is_some_and(|info| info.location.is_some());
        (located == self.wanted).then_some(node)
    }
}
