//! Resource sources
//!
//! A source lists one kind of workspace object and yields one
//! [`VersionedDocument`] per exported resource. Sources run as independent
//! tasks; see [`stream_source`].
//!
//! - [`registry`] - Builds the enabled sources from the export configuration
//! - [`filter`] - Glob filters on object names
//! - [`permissions`] - Companion access control documents
//! - [`clusters`], [`instance_pools`], [`instance_profiles`], [`notebooks`] -
//!   Concrete sources

pub mod clusters;
pub mod filter;
pub mod instance_pools;
pub mod instance_profiles;
pub mod notebooks;
pub mod permissions;
pub mod registry;

pub use filter::PatternFilter;

use crate::api::WorkspaceClient;
use crate::document::{Artifact, RawResource, VersionedDocument};
use crate::error::ExportError;
use crate::naming::normalize_identifier;
use crate::pipeline::files::ExportFiles;
use crate::processor::{MappedVariableExtractor, ProcessorChain};
use crate::report::{EndRecord, EventSink, ItemStatus, StartRecord};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Producer of documents for one object kind
#[async_trait]
pub trait ResourceSource: Send + Sync {
    /// Folder under `exports/` receiving this source's files
    fn folder_name(&self) -> &str;

    /// Terraform resource type of the primary documents
    fn resource_type(&self) -> &str;

    /// Yield every document through `out`
    async fn generate(&self, out: &DocumentSender) -> Result<(), ExportError>;
}

/// Hands documents from a source to the engine
#[derive(Clone)]
pub struct DocumentSender {
    tx: mpsc::Sender<VersionedDocument>,
    events: Arc<dyn EventSink>,
}

impl DocumentSender {
    pub fn new(tx: mpsc::Sender<VersionedDocument>, events: Arc<dyn EventSink>) -> Self {
        Self { tx, events }
    }

    /// Record the start of every item of `doc`, then pass it on.
    ///
    /// Fails once the engine stopped consuming; the source should return.
    pub async fn emit(&self, doc: VersionedDocument) -> Result<(), ExportError> {
        tracing::info!(
            "Processing: {} with name: {} and id: {}",
            doc.resource_type(),
            doc.raw().display_name(),
            doc.raw().external_id()
        );
        for (item_id, api_id, display_name) in doc.report_items() {
            self.events.start(StartRecord {
                workspace_url: doc.raw().origin_url().to_string(),
                item_id,
                resource_type: doc.resource_type().to_string(),
                api_id,
                display_name,
            });
        }
        let identifier = doc.identifier().to_string();
        self.tx
            .send(doc)
            .await
            .map_err(|_| ExportError::Closed { resource: identifier })
    }
}

/// Run `source` on its own task and stream its documents.
///
/// At most `buffer` documents wait in the channel; the source is paused
/// until the consumer catches up. A failing source ends its stream and is
/// reported under its folder name and resource type.
pub fn stream_source(
    source: Arc<dyn ResourceSource>,
    buffer: usize,
    events: Arc<dyn EventSink>,
) -> ReceiverStream<VersionedDocument> {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    tokio::spawn(async move {
        let folder = source.folder_name().to_string();
        let sender = DocumentSender::new(tx, events.clone());
        match source.generate(&sender).await {
            Ok(()) => tracing::debug!("source {} exhausted", folder),
            Err(ExportError::Closed { resource }) => {
                tracing::debug!("source {} stopped at {}: pipeline closed", folder, resource)
            }
            Err(e) => {
                tracing::error!("source {} failed: {}", folder, e);
                events.end(EndRecord {
                    item_id: folder,
                    resource_type: source.resource_type().to_string(),
                    status: ItemStatus::Failed { error: e.to_string() },
                });
            }
        }
    });
    ReceiverStream::new(rx)
}

/// Shared inputs of the concrete sources
#[derive(Clone, Debug)]
pub struct SourceContext {
    pub client: WorkspaceClient,
    pub files: ExportFiles,
    pub filter: PatternFilter,
    pub custom_map_vars: BTreeMap<String, Option<String>>,
}

impl SourceContext {
    /// Context with `patterns` compiled into a name filter
    pub fn new(
        client: WorkspaceClient,
        files: ExportFiles,
        patterns: &[String],
        custom_map_vars: BTreeMap<String, Option<String>>,
    ) -> Result<Self, ExportError> {
        Ok(Self {
            client,
            files,
            filter: PatternFilter::new(patterns)?,
            custom_map_vars,
        })
    }

    /// Extractor over `defaults` overridden by the configured map vars
    pub fn map_processors(&self, folder: &str, defaults: &[(&str, Option<&str>)]) -> Result<ProcessorChain, ExportError> {
        let mut merged: BTreeMap<String, Option<String>> = defaults
            .iter()
            .map(|(k, v)| (k.to_string(), v.map(str::to_string)))
            .collect();
        merged.extend(self.custom_map_vars.clone());
        if merged.is_empty() {
            return Ok(ProcessorChain::default());
        }
        let extractor = MappedVariableExtractor::new(folder, merged)?;
        Ok(ProcessorChain::default().with(extractor))
    }

    /// Raw resource with its output paths filled in
    pub fn raw_resource(&self, folder: &str, external_id: &str, identifier: &str, payload: Value) -> RawResource {
        RawResource::new(external_id, self.client.url(), identifier, payload).with_paths(
            self.files.resource_path(folder, identifier),
            ExportFiles::relative_resource_path(folder, identifier),
        )
    }

    /// Build a document from a mapping result; a failed mapping becomes
    /// an error-only document so it still shows up in the report.
    pub fn create_document(
        &self,
        folder: &str,
        resource_type: &str,
        object: ObjectRef<'_>,
        mapped: Result<serde_json::Map<String, Value>, ExportError>,
        processors: &ProcessorChain,
    ) -> VersionedDocument {
        let payload = match &mapped {
            Ok(body) => Value::Object(body.clone()),
            Err(_) => Value::Null,
        };
        let raw = self
            .raw_resource(folder, object.external_id, &object.identifier, payload)
            .with_display_name(object.display_name)
            .with_artifacts(object.artifacts);
        match mapped {
            Ok(_) => VersionedDocument::new(resource_type, raw).with_processors(processors.clone()),
            Err(e) => VersionedDocument::failed(resource_type, raw, e),
        }
    }
}

/// Ids and side content of one exported object
#[derive(Debug, Clone)]
pub struct ObjectRef<'a> {
    pub external_id: &'a str,
    pub identifier: String,
    pub display_name: Option<&'a str>,
    pub artifacts: Vec<Artifact>,
}

impl<'a> ObjectRef<'a> {
    pub fn new(external_id: &'a str, identifier: String) -> Self {
        Self {
            external_id,
            identifier,
            display_name: None,
            artifacts: Vec::new(),
        }
    }

    /// Display name shown in reports instead of the id
    pub fn named(mut self, display_name: &'a str) -> Self {
        self.display_name = Some(display_name);
        self
    }

    pub fn with_artifacts(mut self, artifacts: Vec<Artifact>) -> Self {
        self.artifacts = artifacts;
        self
    }
}

/// `normalize_identifier("<prefix>-<id>")`
pub fn identifier(prefix: &str, id: &str) -> String {
    normalize_identifier(&format!("{prefix}-{id}"))
}
