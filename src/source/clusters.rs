//! Interactive clusters
//!
//! Job clusters are skipped; they are recreated by their jobs. Init
//! scripts, log destinations and libraries stored on S3 only make sense on
//! AWS and are guarded accordingly.

use super::instance_pools::{self, pool_identifier};
use super::{identifier, DocumentSender, ObjectRef, ResourceSource, SourceContext};
use crate::error::ExportError;
use crate::hcl::interpolate;
use crate::hcl::{BlockCondition, BlockKind, Cloud, DocumentBuilder, FieldAccess};
use crate::processor::ProcessorChain;
use async_trait::async_trait;
use serde_json::{Map, Value};

pub const FOLDER: &str = "cluster";
pub const RESOURCE_TYPE: &str = "databricks_cluster";

const DEFAULT_MAP_VARS: &[(&str, Option<&str>)] = &[
    ("node_type_id", None),
    ("driver_node_type_id", None),
    ("dynamic.[*].library.content.jar", None),
    ("dynamic.[*].library.content.whl", None),
    ("dynamic.[*].library.content.egg", None),
];

const DEFAULT_CLUSTER_SOURCES: &[&str] = &["UI", "API"];

/// Interactive and job clusters
pub struct ClusterSource {
    ctx: SourceContext,
    processors: ProcessorChain,
    cluster_sources: Vec<String>,
}

impl ClusterSource {
    /// Cluster source keeping clusters created by one of `cluster_sources`
    pub fn new(ctx: SourceContext, cluster_sources: Option<Vec<String>>) -> Result<Self, ExportError> {
        let processors = ctx.map_processors(FOLDER, DEFAULT_MAP_VARS)?;
        let cluster_sources = cluster_sources
            .unwrap_or_else(|| DEFAULT_CLUSTER_SOURCES.iter().map(|s| s.to_string()).collect());
        Ok(Self {
            ctx,
            processors,
            cluster_sources,
        })
    }

    fn is_exported_source(&self, cluster: &Value) -> bool {
        match cluster.get("cluster_source").and_then(Value::as_str) {
            Some(source) => self.cluster_sources.iter().any(|s| s == source),
            None => true,
        }
    }

    async fn libraries(&self, cluster_id: &str) -> Result<Vec<Value>, ExportError> {
        let status = self
            .ctx
            .client
            .get("libraries/cluster-status", &[("cluster_id", cluster_id.to_string())])
            .await
            .map_err(|e| ExportError::fetch(format!("libraries of {cluster_id}"), format!("{e:#}")))?;
        Ok(status
            .get("library_statuses")
            .and_then(Value::as_array)
            .map(|statuses| {
                statuses
                    .iter()
                    .filter(|s| s.get("is_library_for_all_clusters").and_then(Value::as_bool) != Some(true))
                    .map(|s| s.get("library").cloned().unwrap_or_else(|| s.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }
}

fn is_s3(path: Option<&Value>) -> bool {
    path.and_then(Value::as_str)
        .and_then(|p| url::Url::parse(p).ok())
        .is_some_and(|u| u.scheme() == "s3")
}

/// Storage info (`{"s3": {"destination": ...}}`) pointing at S3
fn is_s3_storage(info: &Value) -> bool {
    info.as_object()
        .and_then(|o| o.values().next())
        .is_some_and(|v| is_s3(v.get("destination")))
}

fn is_s3_library(library: &Value) -> bool {
    ["jar", "whl", "egg"]
        .iter()
        .any(|kind| is_s3(library.get(*kind)))
}

/// Split into (AWS only, cloud agnostic)
fn split_by_cloud(items: &[Value], aws_only: fn(&Value) -> bool) -> (Vec<Value>, Vec<Value>) {
    items.iter().cloned().partition(|item| aws_only(item))
}

fn list_at(data: &Value, field: &str) -> Vec<Value> {
    data.get(field).and_then(Value::as_array).cloned().unwrap_or_default()
}

/// Map a cluster and its installed libraries to a `databricks_cluster` body
pub fn make_cluster_dict(data: &Value, libraries: &[Value]) -> Result<Map<String, Value>, ExportError> {
    let cluster_id = data.get_path("cluster_id").and_then(Value::as_str).unwrap_or_default();
    let aws = Some(BlockCondition::Cloud(Cloud::Aws));

    let (aws_scripts, scripts) = split_by_cloud(&list_at(data, "init_scripts"), is_s3_storage);
    let (aws_log_conf, log_conf) = match data.get("cluster_log_conf") {
        Some(conf) if is_s3_storage(conf) => (vec![conf.clone()], Vec::new()),
        Some(conf) if !conf.is_null() => (Vec::new(), vec![conf.clone()]),
        _ => (Vec::new(), Vec::new()),
    };
    let (aws_libraries, libraries) = split_by_cloud(libraries, is_s3_library);

    let builder = DocumentBuilder::new(RESOURCE_TYPE)
        .for_object(cluster_id)
        .required("cluster_name", || {
            Ok(data.get("cluster_name").cloned().unwrap_or_else(|| Value::String(String::new())))
        })
        .required("spark_version", || data.value("spark_version"))
        .optional("driver_node_type_id", || data.value("driver_node_type_id"))
        .optional("instance_pool_id", || {
            let pool_id = data.require_str("instance_pool_id")?;
            Ok(Value::String(interpolate::resource(
                instance_pools::RESOURCE_TYPE,
                &pool_identifier(pool_id),
                "id",
            )))
        })
        // autoscale and a fixed size are mutually exclusive
        .optional_if(data.get("autoscale").is_none(), "num_workers", || data.value("num_workers"))
        .optional("autotermination_minutes", || data.value("autotermination_minutes"))
        .optional("enable_local_disk_encryption", || data.value("enable_local_disk_encryption"))
        .optional("single_user_name", || data.value("single_user_name"))
        .optional("ssh_public_keys", || data.value("ssh_public_keys"))
        .optional("spark_env_vars", || data.value("spark_env_vars"))
        .optional("custom_tags", || data.value("custom_tags"))
        .optional("spark_conf", || data.value("spark_conf"))
        .optional("enable_elastic_disk", || {
            let current = data.require("enable_elastic_disk")?;
            // Azure always runs with elastic disk
            Ok(Value::String(interpolate::ternary(
                &Cloud::Azure.condition(),
                "true",
                &current.to_string(),
            )))
        })
        .block(BlockKind::Autoscale, || data.value("autoscale"))
        .block(BlockKind::AwsAttributes, || data.value("aws_attributes"))
        .block(BlockKind::AzureAttributes, || data.value("azure_attributes"))
        .block(BlockKind::GcpAttributes, || data.value("gcp_attributes"))
        .dynamic_blocks(BlockKind::InitScripts.field_name(), || Ok(Value::Array(aws_scripts)), aws.clone())
        .dynamic_blocks(BlockKind::InitScripts.field_name(), || Ok(Value::Array(scripts)), None)
        .dynamic_blocks(BlockKind::Library.field_name(), || Ok(Value::Array(aws_libraries)), aws.clone())
        .dynamic_blocks(BlockKind::Library.field_name(), || Ok(Value::Array(libraries)), None)
        .dynamic_blocks(BlockKind::ClusterLogConf.field_name(), || Ok(Value::Array(aws_log_conf)), aws)
        .dynamic_blocks(BlockKind::ClusterLogConf.field_name(), || Ok(Value::Array(log_conf)), None)
        .required("node_type_id", || data.value("node_type_id"));
    builder.build()
}

#[async_trait]
impl ResourceSource for ClusterSource {
    fn folder_name(&self) -> &str {
        FOLDER
    }

    fn resource_type(&self) -> &str {
        RESOURCE_TYPE
    }

    async fn generate(&self, out: &DocumentSender) -> Result<(), ExportError> {
        let response = self
            .ctx
            .client
            .get("clusters/list", &[])
            .await
            .map_err(|e| ExportError::fetch(FOLDER, format!("{e:#}")))?;
        let clusters = list_at(&response, "clusters");
        tracing::info!("Fetched {} clusters", clusters.len());

        for cluster in clusters.iter().filter(|c| self.is_exported_source(c)) {
            let Some(cluster_id) = cluster.get("cluster_id").and_then(Value::as_str) else {
                tracing::warn!("Skipping cluster without id");
                continue;
            };
            let name = cluster.get("cluster_name").and_then(Value::as_str).unwrap_or_default();
            if !self.ctx.filter.matches(name) {
                continue;
            }

            let mapped = match self.libraries(cluster_id).await {
                Ok(libraries) => make_cluster_dict(cluster, &libraries),
                Err(e) => Err(e),
            };
            let object = ObjectRef::new(cluster_id, identifier(RESOURCE_TYPE, cluster_id)).named(name);
            let doc = self
                .ctx
                .create_document(FOLDER, RESOURCE_TYPE, object, mapped, &self.processors);
            out.emit(doc).await?;
        }
        Ok(())
    }
}
