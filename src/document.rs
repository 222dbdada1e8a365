//! Versioned documents
//!
//! A [`VersionedDocument`] is the intermediate form of one exported
//! resource. It keeps every payload snapshot produced by the processor
//! chain, the variables discovered along the way and the errors that
//! stopped it.

use crate::error::ExportError;
use crate::hcl::TerraformJson;
use crate::processor::ProcessorChain;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Fetches the bytes behind an [`Artifact`]
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    async fn fetch(&self, remote_path: &str) -> anyhow::Result<Vec<u8>>;
}

/// Side content of a resource (notebook source, file body)
///
/// Content is fetched lazily on first access and cached for the rest of
/// the run, clones share the cache.
#[derive(Clone)]
pub struct Artifact {
    remote_path: String,
    local_path: PathBuf,
    fetcher: Arc<dyn ArtifactFetcher>,
    content: Arc<OnceCell<Vec<u8>>>,
}

impl Artifact {
    /// Artifact at `remote_path`, saved to `local_path`, read through `fetcher`
    pub fn new(remote_path: impl Into<String>, local_path: PathBuf, fetcher: Arc<dyn ArtifactFetcher>) -> Self {
        Self {
            remote_path: remote_path.into(),
            local_path,
            fetcher,
            content: Arc::new(OnceCell::new()),
        }
    }

    /// Workspace path the content is fetched from
    pub fn remote_path(&self) -> &str {
        &self.remote_path
    }

    /// Where the content is written next to the resource file
    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    /// The content, fetched on first call only.
    ///
    /// Clones of one artifact share the cached bytes.
    pub async fn content(&self) -> Result<&[u8], ExportError> {
        let bytes = self
            .content
            .get_or_try_init(|| async {
                self.fetcher
                    .fetch(&self.remote_path)
                    .await
                    .map_err(|e| ExportError::Artifact {
                        remote_path: self.remote_path.clone(),
                        message: format!("{e:#}"),
                    })
            })
            .await?;
        Ok(bytes.as_slice())
    }
}

impl fmt::Debug for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Artifact")
            .field("remote_path", &self.remote_path)
            .field("local_path", &self.local_path)
            .field("fetched", &self.content.initialized())
            .finish()
    }
}

/// One object as fetched from the workspace
#[derive(Debug, Clone)]
pub struct RawResource {
    external_id: String,
    origin_url: String,
    target_identifier: String,
    payload: Value,
    save_path: PathBuf,
    relative_save_path: String,
    artifacts: Vec<Artifact>,
    display_name: String,
}

impl RawResource {
    /// Resource without output paths; its display name defaults to the id
    pub fn new(
        external_id: impl Into<String>,
        origin_url: impl Into<String>,
        target_identifier: impl Into<String>,
        payload: Value,
    ) -> Self {
        let external_id = external_id.into();
        Self {
            display_name: external_id.clone(),
            external_id,
            origin_url: origin_url.into(),
            target_identifier: target_identifier.into(),
            payload,
            save_path: PathBuf::new(),
            relative_save_path: String::new(),
            artifacts: Vec::new(),
        }
    }

    /// Absolute output path and the path recorded in reports
    pub fn with_paths(mut self, save_path: PathBuf, relative_save_path: impl Into<String>) -> Self {
        self.save_path = save_path;
        self.relative_save_path = relative_save_path.into();
        self
    }

    pub fn with_artifacts(mut self, artifacts: Vec<Artifact>) -> Self {
        self.artifacts = artifacts;
        self
    }

    /// Replace the display name when one is given
    pub fn with_display_name(mut self, name: Option<impl Into<String>>) -> Self {
        if let Some(name) = name {
            self.display_name = name.into();
        }
        self
    }

    /// Id of the object in the workspace API
    pub fn external_id(&self) -> &str {
        &self.external_id
    }

    /// Workspace the object was fetched from
    pub fn origin_url(&self) -> &str {
        &self.origin_url
    }

    /// Terraform identifier of the resource
    pub fn target_identifier(&self) -> &str {
        &self.target_identifier
    }

    /// Mapped resource body before any processor ran
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn save_path(&self) -> &Path {
        &self.save_path
    }

    pub fn relative_save_path(&self) -> &str {
        &self.relative_save_path
    }

    pub fn artifacts(&self) -> &[Artifact] {
        &self.artifacts
    }

    /// Human readable name shown in reports
    pub fn display_name(&self) -> &str {
        &self.display_name
    }
}

/// A Terraform variable
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Variable {
    pub name: String,
    pub default: Option<String>,
}

impl Variable {
    /// Variable `name` with an optional default value
    pub fn new(name: impl Into<String>, default: Option<String>) -> Self {
        Self {
            name: name.into(),
            default,
        }
    }

    /// `{}` or `{"default": ...}`
    pub fn to_body(&self) -> Value {
        let mut body = Map::new();
        if let Some(default) = &self.default {
            body.insert("default".to_string(), Value::String(default.clone()));
        }
        Value::Object(body)
    }
}

/// A `locals` entry backing a `for_each` collection
#[derive(Debug, Clone, PartialEq)]
pub struct LocalVariable {
    pub name: String,
    pub data: Map<String, Value>,
}

/// Lineage-tracked intermediate representation of one resource
#[derive(Debug, Clone)]
pub struct VersionedDocument {
    resource_type: String,
    raw: RawResource,
    lineage: Vec<Value>,
    discovered_variables: Vec<Variable>,
    resource_variables: Vec<Variable>,
    local_variables: BTreeMap<String, LocalVariable>,
    errors: Vec<ExportError>,
    for_each_pairs: Vec<(String, String)>,
    processors: ProcessorChain,
}

impl VersionedDocument {
    /// Document whose lineage starts with the raw payload
    pub fn new(resource_type: impl Into<String>, raw: RawResource) -> Self {
        let first = raw.payload().clone();
        Self {
            resource_type: resource_type.into(),
            raw,
            lineage: vec![first],
            discovered_variables: Vec::new(),
            resource_variables: Vec::new(),
            local_variables: BTreeMap::new(),
            errors: Vec::new(),
            for_each_pairs: Vec::new(),
            processors: ProcessorChain::default(),
        }
    }

    /// Document standing in for an object whose mapping failed
    pub fn failed(resource_type: impl Into<String>, raw: RawResource, err: ExportError) -> Self {
        let mut doc = Self::new(resource_type, raw);
        doc.add_error(err);
        doc
    }

    /// Processors the pipeline applies to this document
    pub fn with_processors(mut self, processors: ProcessorChain) -> Self {
        self.processors = processors;
        self
    }

    /// Terraform resource type, e.g. `databricks_cluster`
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn raw(&self) -> &RawResource {
        &self.raw
    }

    /// Terraform identifier, unique within a run
    pub fn identifier(&self) -> &str {
        self.raw.target_identifier()
    }

    pub fn processors(&self) -> &ProcessorChain {
        &self.processors
    }

    /// Every payload snapshot, oldest first
    pub fn lineage(&self) -> &[Value] {
        &self.lineage
    }

    /// Latest payload snapshot
    pub fn latest(&self) -> &Value {
        // lineage always starts with the raw payload
        &self.lineage[self.lineage.len() - 1]
    }

    fn ensure_mutable(&self) -> Result<(), ExportError> {
        if self.has_errors() {
            return Err(ExportError::LineageFrozen {
                identifier: self.identifier().to_string(),
            });
        }
        Ok(())
    }

    /// Push a new snapshot onto the lineage
    pub fn modify(&mut self, payload: Value) -> Result<(), ExportError> {
        self.ensure_mutable()?;
        self.lineage.push(payload);
        Ok(())
    }

    /// Whether the latest payload is sourced from a `for_each` collection
    pub fn is_for_each(&self) -> bool {
        self.latest().get("for_each").is_some()
    }

    /// Variables found by processors, bound for the shared variables file
    pub fn discovered_variables(&self) -> &[Variable] {
        &self.discovered_variables
    }

    /// Record a discovered variable; exact duplicates are ignored
    pub fn add_discovered_variable(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let variable = Variable::new(name, Some(value.into()));
        if !self.discovered_variables.contains(&variable) {
            self.discovered_variables.push(variable);
        }
    }

    /// Variables declared in the resource file itself
    pub fn resource_variables(&self) -> &[Variable] {
        &self.resource_variables
    }

    pub fn add_resource_variable(&mut self, name: impl Into<String>, default: Option<String>) {
        self.resource_variables.push(Variable::new(name, default));
    }

    /// `locals` entries feeding a `for_each` resource
    pub fn local_variables(&self) -> impl Iterator<Item = &LocalVariable> {
        self.local_variables.values()
    }

    /// Insert or replace a `locals` entry; fails once the document has errors
    pub fn upsert_local_variable(&mut self, name: impl Into<String>, data: Map<String, Value>) -> Result<(), ExportError> {
        self.ensure_mutable()?;
        let name = name.into();
        self.local_variables
            .insert(name.clone(), LocalVariable { name, data });
        Ok(())
    }

    /// `(key, name)` of every object folded into a `for_each` resource
    pub fn for_each_pairs(&self) -> &[(String, String)] {
        &self.for_each_pairs
    }

    pub fn add_for_each_pairs(&mut self, pairs: impl IntoIterator<Item = (String, String)>) {
        self.for_each_pairs.extend(pairs);
    }

    pub fn errors(&self) -> &[ExportError] {
        &self.errors
    }

    /// A document with errors is never written
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Record an error; the lineage is frozen from now on
    pub fn add_error(&mut self, err: ExportError) {
        tracing::debug!("{} {}: {}", self.resource_type, self.identifier(), err);
        self.errors.push(err);
    }

    /// Joined error text for reports
    pub fn error_message(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Items this document stands for: one per for-each pair, or itself
    pub fn report_items(&self) -> Vec<(String, String, String)> {
        if self.for_each_pairs.is_empty() {
            vec![(
                self.identifier().to_string(),
                self.raw.external_id().to_string(),
                self.raw.display_name().to_string(),
            )]
        } else {
            self.for_each_pairs
                .iter()
                .map(|(key, name)| (key.clone(), key.clone(), name.clone()))
                .collect()
        }
    }

    /// Render the resource file: resource variables, locals and the latest payload
    pub fn to_terraform_json(&self) -> Result<String, ExportError> {
        let mut doc = TerraformJson::new();
        for variable in &self.resource_variables {
            doc.add_variable(&variable.name, variable.to_body())?;
        }
        for local in self.local_variables.values() {
            doc.add_locals(&local.name, Value::Object(local.data.clone()));
        }
        doc.add_resource(&self.resource_type, self.identifier(), self.latest().clone())?;
        Ok(doc.to_json())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> VersionedDocument {
        let raw = RawResource::new("0101-abc", "https://ws", "databricks_cluster_0101_abc", json!({"a": 1}));
        VersionedDocument::new("databricks_cluster", raw)
    }

    #[test]
    fn test_lineage_is_append_only() {
        let mut d = doc();
        d.modify(json!({"a": 2})).unwrap();
        assert_eq!(d.lineage().len(), 2);
        assert_eq!(d.lineage()[0], json!({"a": 1}));
        assert_eq!(d.latest(), &json!({"a": 2}));
    }

    #[test]
    fn test_errors_freeze_lineage() {
        let mut d = doc();
        d.add_error(ExportError::RequiredFieldMissing { field: "x".into() });
        assert!(d.modify(json!({})).is_err());
        assert!(d.upsert_local_variable("l", Map::new()).is_err());
        assert_eq!(d.lineage().len(), 1);
        d.add_error(ExportError::fetch("x", "y"));
        assert_eq!(d.errors().len(), 2);
    }

    #[test]
    fn test_discovered_variables_are_a_set() {
        let mut d = doc();
        d.add_discovered_variable("v", "1");
        d.add_discovered_variable("v", "1");
        d.add_discovered_variable("v", "2");
        assert_eq!(d.discovered_variables().len(), 2);
    }

    #[test]
    fn test_terraform_json_layout() {
        let mut d = doc();
        d.add_resource_variable("token", None);
        d.upsert_local_variable("items", json!({"k": {"x": 1}}).as_object().unwrap().clone())
            .unwrap();
        let rendered: Value = serde_json::from_str(&d.to_terraform_json().unwrap()).unwrap();
        assert_eq!(rendered["variable"]["token"], json!({}));
        assert_eq!(rendered["locals"]["items"]["k"]["x"], 1);
        assert_eq!(
            rendered["resource"]["databricks_cluster"]["databricks_cluster_0101_abc"],
            json!({"a": 1})
        );
    }

    #[test]
    fn test_report_items_expand_for_each_pairs() {
        let mut d = doc();
        assert_eq!(d.report_items().len(), 1);
        d.add_for_each_pairs(vec![("arn:1".to_string(), "one".to_string()), ("arn:2".to_string(), "two".to_string())]);
        let items = d.report_items();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].2, "two");
    }
}
