//! Builder and gateway configuration
//!
//! A YAML file names the semantic header, the record files to import and
//! the tuning knobs of the builder. Every field has a default so a minimal
//! file only needs `semantic_header`.

use crate::error::{EkgError, EkgResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Write policy for class-level DF edges that already exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AggregationPolicy {
    /// Existing edges keep their count
    #[default]
    CreateOnly,
    /// Existing edges get the freshly computed count
    Overwrite,
}

/// Tuning knobs of the construction pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// Distinct identity count below which nodes are merged while created
    pub merge_first_threshold: usize,
    pub event_label: String,
    pub timestamp_attribute: String,
    /// Label of activity class nodes used by aggregation
    pub class_label: String,
    pub aggregation_policy: AggregationPolicy,
    /// Fail when a merge pass leaves two nodes with one identity
    pub verify_merge_invariant: bool,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            merge_first_threshold: 1000,
            event_label: "Event".to_string(),
            timestamp_attribute: "timestamp".to_string(),
            class_label: "Activity".to_string(),
            aggregation_policy: AggregationPolicy::CreateOnly,
            verify_merge_invariant: true,
        }
    }
}

/// Which store the builder talks to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GatewayConfig {
    /// In-process graph store
    #[default]
    Embedded,
    /// Neo4j-compatible HTTP transactional endpoint
    Remote {
        url: String,
        #[serde(default = "default_database")]
        database: String,
        #[serde(default)]
        user: Option<String>,
        #[serde(default)]
        password: Option<String>,
    },
}

fn default_database() -> String {
    "neo4j".to_string()
}

/// A JSON file of records to import into the embedded store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordFile {
    pub path: PathBuf,
    /// Labels given to every imported record node
    pub labels: Vec<String>,
    /// Attributes parsed as timestamps
    #[serde(default)]
    pub datetime_attributes: Vec<String>,
}

/// Aggregation run requested from the command line or configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    pub entity_type: String,
    #[serde(default)]
    pub classifiers: Vec<String>,
    #[serde(default)]
    pub df_threshold: u64,
    #[serde(default)]
    pub relative_df_threshold: f64,
    #[serde(default = "default_true")]
    pub exclude_self_loops: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EkgConfig {
    pub semantic_header: PathBuf,

    #[serde(default)]
    pub records: Vec<RecordFile>,

    #[serde(default)]
    pub builder: BuilderConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub discovery: Vec<DiscoveryConfig>,
}

impl EkgConfig {
    pub fn from_yaml_str(yaml: &str) -> EkgResult<Self> {
        let config: EkgConfig = serde_yaml::from_str(yaml)?;
        config.builder.validate()?;
        Ok(config)
    }

    /// Load a YAML file. Relative paths inside it resolve against the
    /// file's directory.
    pub fn from_path(path: impl AsRef<Path>) -> EkgResult<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml_str(&yaml)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        if self.semantic_header.is_relative() {
            self.semantic_header = base.join(&self.semantic_header);
        }
        for record in &mut self.records {
            if record.path.is_relative() {
                record.path = base.join(&record.path);
            }
        }
    }
}

impl BuilderConfig {
    pub fn validate(&self) -> EkgResult<()> {
        if self.event_label.is_empty() {
            return Err(EkgError::config("builder.event_label must not be empty"));
        }
        if self.class_label.is_empty() {
            return Err(EkgError::config("builder.class_label must not be empty"));
        }
        if self.timestamp_attribute.is_empty() {
            return Err(EkgError::config("builder.timestamp_attribute must not be empty"));
        }
        Ok(())
    }
}
