//! Notebooks
//!
//! Workspace folders are walked recursively. Each notebook becomes a
//! `databricks_notebook` resource plus an artifact holding its source,
//! downloaded into `exports/notebook/data/`.

use super::{identifier, DocumentSender, ObjectRef, ResourceSource, SourceContext};
use crate::api::WorkspaceClient;
use crate::document::{Artifact, ArtifactFetcher};
use crate::error::ExportError;
use crate::hcl::{interpolate, DocumentBuilder, FieldAccess};
use crate::processor::ProcessorChain;
use anyhow::Context;
use async_trait::async_trait;
use base64::Engine;
use serde_json::{Map, Value};
use std::sync::Arc;

pub const FOLDER: &str = "notebook";
pub const RESOURCE_TYPE: &str = "databricks_notebook";

/// Downloads notebook sources through the workspace export API
pub struct NotebookExporter {
    client: WorkspaceClient,
}

impl NotebookExporter {
    pub fn new(client: WorkspaceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ArtifactFetcher for NotebookExporter {
    async fn fetch(&self, remote_path: &str) -> anyhow::Result<Vec<u8>> {
        let data = self
            .client
            .get(
                "workspace/export",
                &[("path", remote_path.to_string()), ("format", "SOURCE".to_string())],
            )
            .await?;
        let Some(content) = data.get("content").and_then(Value::as_str) else {
            tracing::error!("Unable to find content for file {}", remote_path);
            anyhow::bail!("no content for notebook {}", remote_path);
        };
        base64::engine::general_purpose::STANDARD
            .decode(content)
            .context("notebook content is not valid base64")
    }
}

/// Notebooks found by walking workspace directories
pub struct NotebookSource {
    ctx: SourceContext,
    processors: ProcessorChain,
    roots: Vec<String>,
    fetcher: Arc<dyn ArtifactFetcher>,
}

impl NotebookSource {
    /// Source exporting every notebook below `roots`
    pub fn new(ctx: SourceContext, roots: Vec<String>) -> Result<Self, ExportError> {
        let processors = ctx.map_processors(FOLDER, &[])?;
        let fetcher = Arc::new(NotebookExporter::new(ctx.client.clone()));
        Ok(Self {
            ctx,
            processors,
            roots,
            fetcher,
        })
    }

    /// Every notebook below `root`, depth first
    async fn list_notebooks(&self, root: &str) -> Result<Vec<Value>, ExportError> {
        let mut notebooks = Vec::new();
        let mut pending = vec![root.to_string()];
        while let Some(path) = pending.pop() {
            let response = self
                .ctx
                .client
                .get("workspace/list", &[("path", path.clone())])
                .await
                .map_err(|e| ExportError::fetch(format!("workspace folder {path}"), format!("{e:#}")))?;
            tracing::info!("Fetched all files & folders from path: {}", path);
            let objects = response.get("objects").and_then(Value::as_array).cloned().unwrap_or_default();
            // reversed so the stack pops folders in listing order
            for obj in objects.into_iter().rev() {
                match obj.get("object_type").and_then(Value::as_str) {
                    Some("NOTEBOOK") => notebooks.push(obj),
                    Some("DIRECTORY") => {
                        if let Some(dir) = obj.get("path").and_then(Value::as_str) {
                            pending.push(dir.to_string());
                        }
                    }
                    _ => {}
                }
            }
        }
        Ok(notebooks)
    }
}

/// Terraform identifier of a notebook, derived from its path
pub fn notebook_identifier(path: &str) -> String {
    identifier(RESOURCE_TYPE, path)
}

fn extension(language: Option<&str>) -> &'static str {
    match language {
        Some("PYTHON") => ".py",
        Some("SCALA") => ".scala",
        Some("R") => ".r",
        Some("SQL") => ".sql",
        _ => "",
    }
}

/// Name of the downloaded source file
pub fn notebook_file_name(data: &Value) -> Option<String> {
    let path = data.get("path").and_then(Value::as_str)?;
    let language = data.get("language").and_then(Value::as_str);
    Some(format!("{}{}", notebook_identifier(path), extension(language)))
}

/// Map a workspace listing entry to a `databricks_notebook` body
pub fn make_notebook_dict(data: &Value) -> Result<Map<String, Value>, ExportError> {
    let path = data.get("path").and_then(Value::as_str).unwrap_or_default();
    DocumentBuilder::new(RESOURCE_TYPE)
        .for_object(path)
        .required("source", || {
            let file = notebook_file_name(data).ok_or_else(|| crate::hcl::FieldError::Missing("path".into()))?;
            Ok(Value::String(format!("{}/data/{}", interpolate::wrap("path.module"), file)))
        })
        .required("path", || data.value("path"))
        .required("language", || data.value("language"))
        .build()
}

#[async_trait]
impl ResourceSource for NotebookSource {
    fn folder_name(&self) -> &str {
        FOLDER
    }

    fn resource_type(&self) -> &str {
        RESOURCE_TYPE
    }

    async fn generate(&self, out: &DocumentSender) -> Result<(), ExportError> {
        for root in &self.roots {
            for notebook in self.list_notebooks(root).await? {
                let Some(path) = notebook.get("path").and_then(Value::as_str) else {
                    continue;
                };
                if !self.ctx.filter.matches(path) {
                    continue;
                }
                let external_id = notebook
                    .get("object_id")
                    .map(|id| match id {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .unwrap_or_else(|| path.to_string());

                let artifacts = notebook_file_name(&notebook)
                    .map(|file| {
                        vec![Artifact::new(
                            path,
                            self.ctx.files.data_path(FOLDER, &file),
                            self.fetcher.clone(),
                        )]
                    })
                    .unwrap_or_default();
                let object = ObjectRef::new(&external_id, notebook_identifier(path))
                    .named(path)
                    .with_artifacts(artifacts);
                let doc = self.ctx.create_document(
                    FOLDER,
                    RESOURCE_TYPE,
                    object,
                    make_notebook_dict(&notebook),
                    &self.processors,
                );
                out.emit(doc).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_notebook_mapping() {
        let data = json!({"path": "/Users/a@b.com/etl", "language": "PYTHON", "object_id": 42});
        let body = make_notebook_dict(&data).unwrap();
        assert_eq!(
            body["source"],
            "${path.module}/data/databricks_notebook_Users_a_b_com_etl.py"
        );
        assert_eq!(body["language"], "PYTHON");
    }

    #[test]
    fn test_missing_language_fails() {
        let data = json!({"path": "/Shared/x"});
        assert_eq!(
            make_notebook_dict(&data).unwrap_err(),
            ExportError::RequiredFieldMissing { field: "language".into() }
        );
        assert_eq!(
            notebook_file_name(&data).unwrap(),
            "databricks_notebook_Shared_x"
        );
    }
}
