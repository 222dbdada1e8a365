//! Export pipeline
//!
//! Sources run concurrently and feed one bounded merge channel. A pool of
//! workers runs each document's processors and downloads its artifacts; a
//! single emitter writes resource files and reports every item. Once every
//! document is through, the shared variables are deduplicated and the
//! run-level files are written.
//!
//! - [`files`] - Output layout
//! - [`collector`] - Variable and parameter dedup lanes

pub mod collector;
pub mod files;

use crate::config::PipelineSettings;
use crate::document::VersionedDocument;
use crate::error::ExportError;
use crate::report::{EndRecord, EventSink, ItemStatus};
use crate::source::{stream_source, ResourceSource};
use collector::{LaneInput, ParameterLane, VariableLane};
use files::{write_file, ExportFiles};
use futures::StreamExt;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// Phase of a run, logged on every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Collecting,
    Processing,
    Deduping,
    Emitting,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Collecting => "collecting",
            Stage::Processing => "processing",
            Stage::Deduping => "deduping",
            Stage::Emitting => "emitting",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Outcome of a completed run
#[derive(Debug, Default)]
pub struct PipelineResults {
    /// Documents that reached the emitter
    pub documents: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Entries written to `mapped_variables.tf.json`
    pub shared_variables: usize,
    /// Lines written to `terraform.tfvars`
    pub parameters: usize,
    /// Rejected variable declarations
    pub collisions: Vec<ExportError>,
    /// Run-level files that could not be written
    pub lane_errors: Vec<ExportError>,
    pub stages: Vec<Stage>,
}

pub struct Pipeline {
    sources: Vec<Arc<dyn ResourceSource>>,
    files: ExportFiles,
    settings: PipelineSettings,
    events: Arc<dyn EventSink>,
    stages: Vec<Stage>,
}

impl Pipeline {
    /// Pipeline over `sources`, writing below `files` and reporting to `events`
    pub fn new(
        sources: Vec<Arc<dyn ResourceSource>>,
        files: ExportFiles,
        settings: PipelineSettings,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            sources,
            files,
            settings,
            events,
            stages: Vec::new(),
        }
    }

    fn enter(&mut self, stage: Stage) {
        tracing::info!("Pipeline stage: {}", stage);
        self.stages.push(stage);
    }

    /// Run every source to completion.
    ///
    /// Per-document failures are reported and do not stop the run. A
    /// duplicate output path or a pool that never drains aborts it.
    pub async fn run(mut self) -> Result<PipelineResults, ExportError> {
        self.enter(Stage::Collecting);
        let buffer = self.settings.buffer.max(1);
        let pending = Arc::new(AtomicUsize::new(0));
        let (merge_tx, merge_rx) = mpsc::channel::<VersionedDocument>(buffer);

        let mut handles: Vec<JoinHandle<()>> = Vec::new();
        for source in &self.sources {
            let mut stream = stream_source(source.clone(), buffer, self.events.clone());
            let tx = merge_tx.clone();
            let pending = pending.clone();
            handles.push(tokio::spawn(async move {
                while let Some(doc) = stream.next().await {
                    pending.fetch_add(1, Ordering::SeqCst);
                    if tx.send(doc).await.is_err() {
                        pending.fetch_sub(1, Ordering::SeqCst);
                        break;
                    }
                }
            }));
        }
        drop(merge_tx);

        self.enter(Stage::Processing);
        let merge_rx = Arc::new(Mutex::new(merge_rx));
        let (done_tx, mut done_rx) = mpsc::channel::<VersionedDocument>(buffer);
        for worker in 0..self.settings.parallelism.max(1) {
            let rx = merge_rx.clone();
            let tx = done_tx.clone();
            let pending = pending.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    let next = rx.lock().await.recv().await;
                    let Some(doc) = next else {
                        tracing::debug!("worker {} finished", worker);
                        break;
                    };
                    let doc = process_document(doc).await;
                    if tx.send(doc).await.is_err() {
                        pending.fetch_sub(1, Ordering::SeqCst);
                        break;
                    }
                }
            }));
        }
        drop(done_tx);

        let mut emitter = Emitter::new(self.events.clone());
        while let Some(doc) = done_rx.recv().await {
            let outcome = emitter.emit(doc).await;
            pending.fetch_sub(1, Ordering::SeqCst);
            if let Err(fatal) = outcome {
                tracing::error!("Aborting export: {}", fatal);
                for handle in &handles {
                    handle.abort();
                }
                return Err(fatal);
            }
        }

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!("pipeline task failed: {}", e);
            }
        }
        self.wait_for_drain(&pending).await?;

        self.enter(Stage::Deduping);
        let mut variables = VariableLane::default();
        let mut parameters = ParameterLane::default();
        for input in &emitter.lanes {
            variables.admit(input);
            parameters.admit(input);
        }

        self.enter(Stage::Emitting);
        let mut lane_errors = Vec::new();
        if !variables.shared().is_empty() {
            let written = match variables.to_terraform_json() {
                Ok(json) => write_file(&self.files.mapped_variables_path(), json).await,
                Err(e) => Err(e),
            };
            lane_errors.extend(written.err());
        }
        if !parameters.is_empty() {
            lane_errors.extend(write_file(&self.files.tfvars_path(), parameters.to_tfvars()).await.err());
            lane_errors.extend(
                write_file(&self.files.env_file_path(), parameters.to_env_file())
                    .await
                    .err(),
            );
        }
        for e in &lane_errors {
            tracing::error!("{}", e);
        }

        self.enter(Stage::Done);
        Ok(PipelineResults {
            documents: emitter.documents,
            succeeded: emitter.succeeded,
            failed: emitter.failed,
            shared_variables: variables.shared().len(),
            parameters: parameters.parameters().len(),
            collisions: variables.collisions().to_vec(),
            lane_errors,
            stages: self.stages,
        })
    }

    /// Poll the in-flight counter until every document is accounted for
    async fn wait_for_drain(&self, pending: &AtomicUsize) -> Result<(), ExportError> {
        let attempts = self.settings.drain_retries;
        for attempt in 0..=attempts {
            let left = pending.load(Ordering::SeqCst);
            if left == 0 {
                return Ok(());
            }
            if attempt == attempts {
                return Err(ExportError::StuckPipeline { pending: left, attempts });
            }
            tracing::debug!("{} documents still pending, drain check {}", left, attempt + 1);
            tokio::time::sleep(self.settings.drain_backoff()).await;
        }
        Ok(())
    }
}

/// Run the processors, then fetch artifacts of documents that are still clean
async fn process_document(mut doc: VersionedDocument) -> VersionedDocument {
    let processors = doc.processors().clone();
    processors.apply(&mut doc);
    if doc.has_errors() {
        return doc;
    }
    let artifacts = doc.raw().artifacts().to_vec();
    for artifact in artifacts {
        let written = match artifact.content().await {
            Ok(content) => {
                tracing::info!(
                    "Content fetched for {} with length {}",
                    artifact.remote_path(),
                    content.len()
                );
                write_file(artifact.local_path(), content).await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            doc.add_error(e);
            break;
        }
    }
    doc
}

/// Sole writer of resource files
struct Emitter {
    events: Arc<dyn EventSink>,
    claimed: HashMap<PathBuf, String>,
    lanes: Vec<LaneInput>,
    documents: usize,
    succeeded: usize,
    failed: usize,
}

impl Emitter {
    fn new(events: Arc<dyn EventSink>) -> Self {
        Self {
            events,
            claimed: HashMap::new(),
            lanes: Vec::new(),
            documents: 0,
            succeeded: 0,
            failed: 0,
        }
    }

    /// Write and report one document. Only a duplicate output path is
    /// returned as an error.
    async fn emit(&mut self, mut doc: VersionedDocument) -> Result<(), ExportError> {
        self.documents += 1;
        if !doc.has_errors() {
            let path = doc.raw().save_path().to_path_buf();
            if let Some(owner) = self.claimed.get(&path) {
                tracing::error!(
                    "{} and {} both map to {}",
                    owner,
                    doc.raw().external_id(),
                    path.display()
                );
                return Err(ExportError::DuplicateIdentifier {
                    identifier: doc.identifier().to_string(),
                    path: doc.raw().relative_save_path().to_string(),
                });
            }
            self.claimed.insert(path.clone(), doc.raw().external_id().to_string());

            let written = match doc.to_terraform_json() {
                Ok(json) => write_file(&path, json).await,
                Err(e) => Err(e),
            };
            if let Err(e) = written {
                doc.add_error(e);
            }
        }

        let status = if doc.has_errors() {
            tracing::error!(
                "Failed to export {} {}: {}",
                doc.resource_type(),
                doc.identifier(),
                doc.error_message()
            );
            self.failed += 1;
            ItemStatus::Failed {
                error: doc.error_message(),
            }
        } else {
            self.succeeded += 1;
            ItemStatus::Succeeded {
                file_path: doc.raw().relative_save_path().to_string(),
            }
        };
        for (item_id, _, _) in doc.report_items() {
            self.events.end(EndRecord {
                item_id,
                resource_type: doc.resource_type().to_string(),
                status: status.clone(),
            });
        }
        if let Some(input) = LaneInput::from_document(&doc) {
            self.lanes.push(input);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::RawResource;
    use crate::report::MemoryReport;
    use serde_json::json;

    fn doc(id: &str, base: &std::path::Path) -> VersionedDocument {
        let files = ExportFiles::new(base);
        let raw = RawResource::new(id, "https://ws", id, json!({"name": id})).with_paths(
            files.resource_path("fixed", id),
            ExportFiles::relative_resource_path("fixed", id),
        );
        VersionedDocument::new("databricks_fixed", raw)
    }

    #[tokio::test]
    async fn test_emitter_writes_and_reports() {
        let dir = tempfile::tempdir().unwrap();
        let report = Arc::new(MemoryReport::new());
        let mut emitter = Emitter::new(report.clone());
        emitter.emit(doc("a", dir.path())).await.unwrap();

        let written = std::fs::read_to_string(dir.path().join("exports/fixed/a.tf.json")).unwrap();
        assert!(written.contains("databricks_fixed"));
        let row = report.get("a", "databricks_fixed").unwrap();
        assert_eq!(
            row.status,
            ItemStatus::Succeeded {
                file_path: "exports/fixed/a.tf.json".into()
            }
        );
        assert_eq!(emitter.lanes.len(), 1);
    }

    #[tokio::test]
    async fn test_emitter_rejects_duplicate_paths() {
        let dir = tempfile::tempdir().unwrap();
        let mut emitter = Emitter::new(Arc::new(MemoryReport::new()));
        emitter.emit(doc("a", dir.path())).await.unwrap();
        let err = emitter.emit(doc("a", dir.path())).await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_failed_documents_are_reported_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let report = Arc::new(MemoryReport::new());
        let mut emitter = Emitter::new(report.clone());
        let mut failed = doc("b", dir.path());
        failed.add_error(ExportError::RequiredFieldMissing { field: "x".into() });
        emitter.emit(failed).await.unwrap();

        assert!(!dir.path().join("exports/fixed/b.tf.json").exists());
        assert_eq!(emitter.failed, 1);
        assert!(emitter.lanes.is_empty());
        assert_eq!(report.summary().total_failed(), 1);
    }

    #[tokio::test]
    async fn test_drain_check_gives_up() {
        let settings = PipelineSettings {
            drain_retries: 2,
            drain_backoff_ms: 1,
            ..PipelineSettings::default()
        };
        let pipeline = Pipeline::new(
            Vec::new(),
            ExportFiles::new("/tmp/unused"),
            settings,
            Arc::new(MemoryReport::new()),
        );
        let pending = AtomicUsize::new(1);
        assert_eq!(
            pipeline.wait_for_drain(&pending).await.unwrap_err(),
            ExportError::StuckPipeline { pending: 1, attempts: 2 }
        );
        pending.store(0, Ordering::SeqCst);
        assert!(pipeline.wait_for_drain(&pending).await.is_ok());
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(Stage::Deduping.to_string(), "deduping");
    }
}
