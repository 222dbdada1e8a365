//! Instance pools

use super::{identifier, permissions, DocumentSender, ObjectRef, ResourceSource, SourceContext};
use crate::error::ExportError;
use crate::hcl::interpolate::{self, PASSIVE_MODE_VARIABLE};
use crate::hcl::{BlockKind, DocumentBuilder, FieldAccess, FieldResult};
use crate::processor::ProcessorChain;
use async_trait::async_trait;
use serde_json::{Map, Value};

pub const FOLDER: &str = "instance_pool";
pub const RESOURCE_TYPE: &str = "databricks_instance_pool";

const DEFAULT_MAP_VARS: &[(&str, Option<&str>)] = &[
    ("node_type_id", Some("%{GREEDYDATA:variable}")),
    ("dynamic.[*].disk_spec.content.ebs_volume_type", None),
    ("dynamic.[*].disk_spec.content.azure_disk_volume_type", None),
];

pub struct InstancePoolSource {
    ctx: SourceContext,
    processors: ProcessorChain,
}

impl InstancePoolSource {
    /// Pool source with the default map vars merged with configured ones
    pub fn new(ctx: SourceContext) -> Result<Self, ExportError> {
        let processors = ctx.map_processors(FOLDER, DEFAULT_MAP_VARS)?;
        Ok(Self { ctx, processors })
    }
}

/// Terraform identifier of a pool, also used by clusters to reference it
pub fn pool_identifier(pool_id: &str) -> String {
    identifier(RESOURCE_TYPE, pool_id)
}

/// Pools keep no idle instances while the export is applied passively
pub fn min_idle_instances(value: &Value) -> Value {
    if value.as_i64() == Some(0) {
        return value.clone();
    }
    Value::String(interpolate::ternary(PASSIVE_MODE_VARIABLE, "0", &value.to_string()))
}

fn disk_spec(data: &Value) -> FieldResult {
    let spec = data.require("disk_spec")?;
    let mut content = Map::new();
    content.insert("disk_size".into(), spec.value("disk_size")?);
    content.insert("disk_count".into(), spec.value("disk_count")?);
    for volume in ["ebs_volume_type", "azure_disk_volume_type"] {
        if let Some(v) = spec.get_path(&format!("disk_type.{volume}")).filter(|v| !v.is_null()) {
            content.insert(volume.into(), v.clone());
        }
    }
    Ok(Value::Object(content))
}

/// Map a pool from `instance-pools/list` to a `databricks_instance_pool` body
pub fn make_instance_pool_dict(data: &Value) -> Result<Map<String, Value>, ExportError> {
    let pool_id = data.get_path("instance_pool_id").and_then(Value::as_str).unwrap_or_default();
    DocumentBuilder::new(RESOURCE_TYPE)
        .for_object(pool_id)
        .required("instance_pool_name", || data.value("instance_pool_name"))
        .required("min_idle_instances", || {
            data.require("min_idle_instances").map(min_idle_instances)
        })
        .required("node_type_id", || data.value("node_type_id"))
        .required("idle_instance_autotermination_minutes", || {
            data.value("idle_instance_autotermination_minutes")
        })
        .optional("max_capacity", || data.value("max_capacity"))
        .optional("enable_elastic_disk", || data.value("enable_elastic_disk"))
        .optional("custom_tags", || data.value("custom_tags"))
        .optional("preloaded_spark_versions", || data.value("preloaded_spark_versions"))
        .block(BlockKind::AwsAttributes, || data.value("aws_attributes"))
        .block(BlockKind::AzureAttributes, || data.value("azure_attributes"))
        .block(BlockKind::GcpAttributes, || data.value("gcp_attributes"))
        .block(BlockKind::DiskSpec, || disk_spec(data))
        .build()
}

#[async_trait]
impl ResourceSource for InstancePoolSource {
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
            .get("instance-pools/list", &[])
            .await
            .map_err(|e| ExportError::fetch(FOLDER, format!("{e:#}")))?;
        let pools = response
            .get("instance_pools")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        tracing::info!("Fetched {} instance pools", pools.len());

        for mut pool in pools {
            let Some(pool_id) = pool.get("instance_pool_id").and_then(Value::as_str).map(str::to_string) else {
                tracing::warn!("Skipping instance pool without id");
                continue;
            };
            let name = pool
                .get("instance_pool_name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            if !self.ctx.filter.matches(&name) {
                continue;
            }
            // Azure requires elastic disk on pools
            pool["enable_elastic_disk"] = Value::Bool(true);

            let object = ObjectRef::new(&pool_id, pool_identifier(&pool_id)).named(&name);
            let mapped = make_instance_pool_dict(&pool);
            let permissions = match &mapped {
                Ok(_) => {
                    self.ctx
                        .permissions_document(FOLDER, &permissions::INSTANCE_POOL, RESOURCE_TYPE, &object)
                        .await
                }
                Err(_) => None,
            };
            let doc = self
                .ctx
                .create_document(FOLDER, RESOURCE_TYPE, object, mapped, &self.processors);
            out.emit(doc).await?;
            if let Some(permissions) = permissions {
                out.emit(permissions).await?;
            }
        }
        Ok(())
    }
}
