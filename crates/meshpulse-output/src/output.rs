//! Output trait, registry and the configured output set

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, warn};

use meshpulse_core::Node;

use crate::error::{OutputError, Result};
use crate::filter::FilterSet;
use crate::nodelist::NodelistOutput;
use crate::raw::RawOutput;

/// Renders a filtered snapshot somewhere
pub trait Output: Send + Sync {
    /// Write `nodes`
    fn save(&self, nodes: &[Node]) -> Result<()>;
}

/// Constructor stored in the output registry
pub type OutputBuilder = fn(&toml::Value) -> Result<Box<dyn Output>>;

/// Every known output by configuration key
pub fn registry() -> HashMap<&'static str, OutputBuilder> {
    let mut outputs: HashMap<&'static str, OutputBuilder> = HashMap::new();
    outputs.insert("nodelist", NodelistOutput::build);
    outputs.insert("raw", RawOutput::build);
    outputs
}

/// One configured output with its filter chain
pub struct ConfiguredOutput {
    /// Registry key the output was built from
    pub kind: String,
    /// Filters run before rendering
    pub filters: FilterSet,
    /// The renderer
    pub output: Box<dyn Output>,
}

/// All outputs built from `nodes.output`
#[derive(Default)]
pub struct OutputSet {
    outputs: Vec<ConfiguredOutput>,
}

impl OutputSet {
    /// Build every enabled output; `enable = false` entries are skipped
    pub fn from_config(config: &BTreeMap<String, Vec<toml::Value>>) -> Result<Self> {
        let registry = registry();
        let mut outputs = Vec::new();

        for (kind, entries) in config {
            let build = registry
                .get(kind.as_str())
                .ok_or_else(|| OutputError::UnknownOutput(kind.clone()))?;

            for entry in entries {
                let table = entry
                    .as_table()
                    .ok_or_else(|| OutputError::invalid_output(kind, "table expected"))?;
                if let Some(enable) = table.get("enable") {
                    let enable = enable
                        .as_bool()
                        .ok_or_else(|| OutputError::invalid_output(kind, "enable must be a boolean"))?;
                    if !enable {
                        debug!(output = %kind, "Output disabled");
                        continue;
                    }
                }

                let filters = match table.get("filter") {
                    Some(filter) => FilterSet::from_config(filter)?,
                    None => FilterSet::default(),
                };
                outputs.push(ConfiguredOutput {
                    kind: kind.clone(),
                    filters,
                    output: build(entry)?,
                });
            }
        }

        Ok(Self { outputs })
    }

    /// Add an already built output
    pub fn push(&mut self, kind: impl Into<String>, filters: FilterSet, output: Box<dyn Output>) {
        self.outputs.push(ConfiguredOutput {
            kind: kind.into(),
            filters,
            output,
        });
    }

    /// Number of enabled outputs
    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    /// Whether nothing is configured
    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Filter `snapshot` per output and render.
    ///
    /// A failing output is logged and does not stop the others. Returns the
    /// number of outputs written.
    pub fn save_all(&self, snapshot: &[Node]) -> usize {
        let mut written = 0;
        for configured in &self.outputs {
            let nodes = configured.filters.apply_all(snapshot.iter().cloned());
            match configured.output.save(&nodes) {
                Ok(()) => written += 1,
                Err(e) => warn!(
                    output = %configured.kind,
                    error = %e,
                    code = e.error_code(),
                    "Output failed"
                ),
            }
        }
        written
    }
}

/// Read the mandatory `path` key of an output table
pub(crate) fn expect_path(kind: &str, config: &toml::Value) -> Result<std::path::PathBuf> {
    config
        .get("path")
        .and_then(toml::Value::as_str)
        .filter(|path| !path.is_empty())
        .map(Into::into)
        .ok_or_else(|| OutputError::invalid_output(kind, "no path given"))
}

/// Serialize `value` to `path` through a temporary file and rename
pub fn save_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let json = serde_json::to_vec(value)?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<usize>>>);

    impl Output for Recorder {
        fn save(&self, nodes: &[Node]) -> Result<()> {
            self.0.lock().unwrap().push(nodes.len());
            Ok(())
        }
    }

    struct Failing;

    impl Output for Failing {
        fn save(&self, _nodes: &[Node]) -> Result<()> {
            Err(std::io::Error::other("disk full").into())
        }
    }

    fn outputs(text: &str) -> BTreeMap<String, Vec<toml::Value>> {
        #[derive(serde::Deserialize)]
        struct Wrapper {
            output: BTreeMap<String, Vec<toml::Value>>,
        }
        toml::from_str::<Wrapper>(text).unwrap().output
    }

    #[test]
    fn test_disabled_entries_skipped() {
        let set = OutputSet::from_config(&outputs(
            r#"
            [[output.nodelist]]
            enable = false
            path = "/nonexistent/nodelist.json"

            [[output.raw]]
            path = "/tmp/raw.json"
            [output.raw.filter]
            no_owner = true
            "#,
        ))
        .unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.outputs[0].kind, "raw");
        assert_eq!(set.outputs[0].filters.len(), 1);
    }

    #[test]
    fn test_unknown_output_rejected() {
        let err = OutputSet::from_config(&outputs("[[output.meshviewer]]\npath = \"x\""))
            .err()
            .unwrap();
        assert_eq!(err.error_code(), "UNKNOWN_OUTPUT");
        assert!(err.is_config_error());
    }

    #[test]
    fn test_missing_path_rejected() {
        let err = OutputSet::from_config(&outputs("[[output.nodelist]]\nenable = true"))
            .err()
            .unwrap();
        assert_eq!(err.error_code(), "INVALID_OUTPUT");
    }

    #[test]
    fn test_failing_output_does_not_stop_others() {
        let recorder = Recorder::default();
        let mut set = OutputSet::default();
        set.push("failing", FilterSet::default(), Box::new(Failing));
        set.push("recorder", FilterSet::default(), Box::new(recorder.clone()));

        let snapshot = vec![Node::new(Utc::now()), Node::new(Utc::now())];
        assert_eq!(set.save_all(&snapshot), 1);
        assert_eq!(*recorder.0.lock().unwrap(), vec![2]);
    }
}
