//! Keep only nodes of selected sites

use std::collections::HashSet;

use meshpulse_core::Node;

use super::{expect_strings, Filter};
use crate::error::Result;

/// Keeps nodes whose site code is listed; nodes without nodeinfo are dropped
#[derive(Debug, Clone)]
pub struct Sites {
    codes: HashSet<String>,
}

impl Sites {
    /// Build from an array of site codes
    pub fn build(value: &toml::Value) -> Result<Box<dyn Filter>> {
        Ok(Box::new(Self {
            codes: expect_strings("sites", value)?.into_iter().collect(),
        }))
    }
}

impl Filter for Sites {
    fn apply(&self, node: Node) -> Option<Node> {
        let site = node.nodeinfo.as_ref()?.system.site_code.as_str();
        self.codes.contains(site).then_some(node)
    }
}
