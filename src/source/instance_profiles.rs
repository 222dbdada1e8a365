//! Instance profiles
//!
//! All profiles are exported as one `for_each` resource over a local map
//! keyed by ARN, guarded to AWS workspaces.

use super::{DocumentSender, ObjectRef, ResourceSource, SourceContext};
use crate::error::ExportError;
use crate::hcl::{Cloud, DocumentBuilder};
use crate::processor::ProcessorChain;
use async_trait::async_trait;
use serde_json::{json, Map, Value};

pub const FOLDER: &str = "instance_profile";
pub const RESOURCE_TYPE: &str = "databricks_instance_profile";
pub const BASE_IDENTIFIER: &str = "databricks_instance_profiles";
pub const FOR_EACH_VAR: &str = "databricks_instance_profiles_for_each_var";

const FIELDS: &[&str] = &["instance_profile_arn"];

pub struct InstanceProfileSource {
    ctx: SourceContext,
    processors: ProcessorChain,
}

impl InstanceProfileSource {
    pub fn new(ctx: SourceContext) -> Result<Self, ExportError> {
        let processors = ctx.map_processors(FOLDER, &[])?;
        Ok(Self { ctx, processors })
    }
}

/// `for_each` body over the profiles local, only applied on AWS
pub fn make_instance_profile_dict() -> Result<Map<String, Value>, ExportError> {
    DocumentBuilder::new(RESOURCE_TYPE)
        .for_each(FOR_EACH_VAR, FIELDS, Some(Cloud::Aws), true)
        .build()
}

/// Local map keyed by ARN, plus the `(arn, name)` report pairs
pub fn collect_profiles(profiles: &[Value]) -> (Map<String, Value>, Vec<(String, String)>) {
    let mut data = Map::new();
    let mut pairs = Vec::new();
    for arn in profiles
        .iter()
        .filter_map(|p| p.get("instance_profile_arn").and_then(Value::as_str))
    {
        data.insert(arn.to_string(), json!({ "instance_profile_arn": arn }));
        pairs.push((arn.to_string(), arn.to_string()));
    }
    (data, pairs)
}

#[async_trait]
impl ResourceSource for InstanceProfileSource {
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
            .get("instance-profiles/list", &[])
            .await
            .map_err(|e| ExportError::fetch(FOLDER, format!("{e:#}")))?;
        let profiles: Vec<Value> = response
            .get("instance_profiles")
            .and_then(Value::as_array)
            .map(|all| {
                all.iter()
                    .filter(|p| {
                        let arn = p.get("instance_profile_arn").and_then(Value::as_str).unwrap_or_default();
                        self.ctx.filter.matches(arn)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        tracing::info!("Fetched {} instance profiles", profiles.len());

        let (data, pairs) = collect_profiles(&profiles);
        let object = ObjectRef::new(BASE_IDENTIFIER, BASE_IDENTIFIER.to_string());
        let mut doc = self.ctx.create_document(
            FOLDER,
            RESOURCE_TYPE,
            object,
            make_instance_profile_dict(),
            &self.processors,
        );
        if !doc.has_errors() {
            doc.upsert_local_variable(FOR_EACH_VAR, data)?;
        }
        doc.add_for_each_pairs(pairs);
        out.emit(doc).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_each_body() {
        let body = make_instance_profile_dict().unwrap();
        assert_eq!(
            body["for_each"],
            "${upper(var.CLOUD) == \"AWS\" ? local.databricks_instance_profiles_for_each_var : {}}"
        );
        assert_eq!(body["instance_profile_arn"], "${each.value.instance_profile_arn}");
    }

    #[test]
    fn test_collect_profiles_keys_by_arn() {
        let (data, pairs) = collect_profiles(&[
            json!({"instance_profile_arn": "arn:aws:iam::1:instance-profile/a"}),
            json!({"is_meta_instance_profile": false}),
        ]);
        assert_eq!(data.len(), 1);
        assert_eq!(
            data["arn:aws:iam::1:instance-profile/a"]["instance_profile_arn"],
            "arn:aws:iam::1:instance-profile/a"
        );
        assert_eq!(pairs[0].0, pairs[0].1);
    }
}
