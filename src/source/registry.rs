//! Source Registry
//!
//! Builds the sources enabled in the export configuration. Map var
//! templates and glob patterns are compiled here, so a bad configuration
//! fails before anything is fetched.

use super::clusters::ClusterSource;
use super::instance_pools::InstancePoolSource;
use super::instance_profiles::InstanceProfileSource;
use super::notebooks::NotebookSource;
use super::{ResourceSource, SourceContext};
use crate::api::WorkspaceClient;
use crate::config::{ExportConfig, ObjectKind};
use crate::error::ExportError;
use crate::pipeline::files::ExportFiles;
use std::sync::Arc;

/// One source per configured object kind, in kind order
pub fn build_sources(
    config: &ExportConfig,
    client: &WorkspaceClient,
    files: &ExportFiles,
) -> Result<Vec<Arc<dyn ResourceSource>>, ExportError> {
    let mut sources: Vec<Arc<dyn ResourceSource>> = Vec::new();
    for kind in config.objects.keys() {
        let Some(settings) = config.object(*kind) else {
            continue;
        };
        let ctx = SourceContext::new(
            client.clone(),
            files.clone(),
            &settings.patterns,
            settings.custom_map_vars.clone(),
        )?;
        let source: Arc<dyn ResourceSource> = match kind {
            ObjectKind::Cluster => Arc::new(ClusterSource::new(ctx, settings.cluster_sources.clone())?),
            ObjectKind::InstancePool => Arc::new(InstancePoolSource::new(ctx)?),
            ObjectKind::InstanceProfile => Arc::new(InstanceProfileSource::new(ctx)?),
            ObjectKind::Notebook => {
                let roots = settings
                    .notebook_path
                    .as_ref()
                    .map(|p| p.to_vec())
                    .unwrap_or_default();
                Arc::new(NotebookSource::new(ctx, roots)?)
            }
        };
        tracing::info!("Enabled source {}", kind.as_str());
        sources.push(source);
    }
    Ok(sources)
}
