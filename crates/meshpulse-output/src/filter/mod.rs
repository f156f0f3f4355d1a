//! Node filters applied before an output renders
//!
//! Each output may carry a `filter` table. Every key names a registered
//! filter, its value is the filter's configuration:
//!
//! ```toml
//! [nodes.output.nodelist.filter]
//! no_owner = true
//! blocklist = ["aabbccddeeff"]
//! sites = ["ffhb"]
//! has_location = true
//! [nodes.output.nodelist.filter.in_area]
//! latitude_min = 53.0
//! latitude_max = 53.2
//! longitude_min = 8.5
//! longitude_max = 9.0
//! ```

mod blocklist;
mod has_location;
mod in_area;
mod no_owner;
mod sites;

use std::collections::HashMap;

use meshpulse_core::Node;

use crate::error::{OutputError, Result};

pub use blocklist::Blocklist;
pub use has_location::HasLocation;
pub use in_area::InArea;
pub use no_owner::NoOwner;
pub use sites::Sites;

/// Transforms or drops a node
pub trait Filter: Send + Sync {
    /// Return the (possibly altered) node, or `None` to drop it
    fn apply(&self, node: Node) -> Option<Node>;
}

/// Constructor stored in the filter registry
pub type FilterBuilder = fn(&toml::Value) -> Result<Box<dyn Filter>>;

/// Every known filter by configuration key
pub fn registry() -> HashMap<&'static str, FilterBuilder> {
    let mut filters: HashMap<&'static str, FilterBuilder> = HashMap::new();
    filters.insert("no_owner", NoOwner::build);
    filters.insert("blocklist", Blocklist::build);
    filters.insert("sites", Sites::build);
    filters.insert("in_area", InArea::build);
    filters.insert("has_location", HasLocation::build);
    filters
}

/// Ordered chain of filters for one output
#[derive(Default)]
pub struct FilterSet {
    filters: Vec<Box<dyn Filter>>,
}

impl FilterSet {
    /// Build a chain from a `filter` table
    pub fn from_config(config: &toml::Value) -> Result<Self> {
        let table = config
            .as_table()
            .ok_or_else(|| OutputError::invalid_filter("filter", "table expected"))?;
        let registry = registry();

        let mut filters = Vec::with_capacity(table.len());
        for (name, value) in table {
            let build = registry
                .get(name.as_str())
                .ok_or_else(|| OutputError::UnknownFilter(name.clone()))?;
            filters.push(build(value)?);
        }
        Ok(Self { filters })
    }

    /// Number of filters in the chain
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Whether the chain passes every node unchanged
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Run one node through the chain
    pub fn apply(&self, node: Node) -> Option<Node> {
        self.filters
            .iter()
            .try_fold(node, |node, filter| filter.apply(node))
    }

    /// Run every node through the chain, keeping the survivors
    pub fn apply_all<I>(&self, nodes: I) -> Vec<Node>
    where
        I: IntoIterator<Item = Node>,
    {
        nodes.into_iter().filter_map(|node| self.apply(node)).collect()
    }
}

/// Read a boolean filter setting
pub(crate) fn expect_bool(name: &str, value: &toml::Value) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| OutputError::invalid_filter(name, "boolean expected"))
}

/// Read an array of strings filter setting
pub(crate) fn expect_strings(name: &str, value: &toml::Value) -> Result<Vec<String>> {
    let items = value
        .as_array()
        .ok_or_else(|| OutputError::invalid_filter(name, "array of strings expected"))?;
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| OutputError::invalid_filter(name, "array of strings expected"))
        })
        .collect()
}
