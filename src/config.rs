//! Export Configuration
//!
//! Loaded from the export YAML file:
//!
//! ```yaml
//! name: nightly
//! objects:
//!   notebook:
//!     notebook_path: ["/Users"]
//!     patterns: ["*etl*"]
//!   cluster:
//!     custom_map_vars:
//!       spark_version: null
//!   instance_pool:
//!   instance_profile:
//! pipeline:
//!   parallelism: 8
//! ```

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Object kinds that can be exported
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Cluster,
    InstancePool,
    InstanceProfile,
    Notebook,
}

impl ObjectKind {
    /// Config key, also the output folder of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Cluster => "cluster",
            ObjectKind::InstancePool => "instance_pool",
            ObjectKind::InstanceProfile => "instance_profile",
            ObjectKind::Notebook => "notebook",
        }
    }
}

/// One or many paths
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathList {
    One(String),
    Many(Vec<String>),
}

impl PathList {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            PathList::One(p) => vec![p.clone()],
            PathList::Many(ps) => ps.clone(),
        }
    }
}

/// Per object kind settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObjectConfig {
    /// Glob patterns; an object is exported only when all of them match
    #[serde(default)]
    pub patterns: Vec<String>,
    /// Dot path to grok template, merged over the kind's defaults
    #[serde(default)]
    pub custom_map_vars: BTreeMap<String, Option<String>>,
    /// Workspace folders to export notebooks from
    #[serde(default)]
    pub notebook_path: Option<PathList>,
    /// Cluster sources to keep (defaults to UI and API)
    #[serde(default)]
    pub cluster_sources: Option<Vec<String>>,
}

/// Engine tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineSettings {
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    #[serde(default = "default_buffer")]
    pub buffer: usize,
    #[serde(default = "default_drain_retries")]
    pub drain_retries: u32,
    #[serde(default = "default_drain_backoff_ms")]
    pub drain_backoff_ms: u64,
}

fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_buffer() -> usize {
    8
}

fn default_drain_retries() -> u32 {
    30
}

fn default_drain_backoff_ms() -> u64 {
    100
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
            buffer: default_buffer(),
            drain_retries: default_drain_retries(),
            drain_backoff_ms: default_drain_backoff_ms(),
        }
    }
}

impl PipelineSettings {
    /// Pause between two drain checks
    pub fn drain_backoff(&self) -> Duration {
        Duration::from_millis(self.drain_backoff_ms)
    }
}

/// Export configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExportConfig {
    pub name: String,
    #[serde(default)]
    pub objects: BTreeMap<ObjectKind, Option<ObjectConfig>>,
    #[serde(default)]
    pub pipeline: PipelineSettings,
}

impl ExportConfig {
    /// Parse and validate a YAML configuration
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content).context("Failed to parse export configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// [`Self::from_yaml_str`] on the content of `path`
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read export configuration {}", path.display()))?;
        Self::from_yaml_str(&content)
    }

    fn validate(&self) -> Result<()> {
        if self.pipeline.parallelism == 0 {
            bail!("pipeline.parallelism must be at least 1");
        }
        if self.pipeline.buffer == 0 {
            bail!("pipeline.buffer must be at least 1");
        }
        if let Some(notebook) = self.objects.get(&ObjectKind::Notebook) {
            let has_paths = notebook
                .as_ref()
                .and_then(|c| c.notebook_path.as_ref())
                .is_some_and(|p| !p.to_vec().is_empty());
            if !has_paths {
                bail!("objects.notebook requires notebook_path");
            }
        }
        Ok(())
    }

    pub fn contains(&self, kind: ObjectKind) -> bool {
        self.objects.contains_key(&kind)
    }

    /// Settings of an enabled kind; a bare `kind:` entry gets defaults
    pub fn object(&self, kind: ObjectKind) -> Option<ObjectConfig> {
        self.objects
            .get(&kind)
            .map(|c| c.clone().unwrap_or_default())
    }
}
