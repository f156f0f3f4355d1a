//! `raw` output: every node record as collected

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

use meshpulse_core::Node;

use crate::error::Result;
use crate::output::{expect_path, save_json, Output};

/// Rendered document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDump {
    /// Generation time
    pub timestamp: DateTime<Utc>,
    /// Full node records
    pub nodes: Vec<Node>,
}

/// Writes [`RawDump`] documents to `path`
#[derive(Debug, Clone)]
pub struct RawOutput {
    path: PathBuf,
}

impl RawOutput {
    /// Build from a table with `path`
    pub fn build(config: &toml::Value) -> Result<Box<dyn Output>> {
        Ok(Box::new(Self {
            path: expect_path("raw", config)?,
        }))
    }
}

impl Output for RawOutput {
    fn save(&self, nodes: &[Node]) -> Result<()> {
        let dump = RawDump {
            timestamp: Utc::now(),
            nodes: nodes.to_vec(),
        };
        save_json(&dump, &self.path)?;
        debug!(path = %self.path.display(), nodes = nodes.len(), "Raw dump written");
        Ok(())
    }
}
