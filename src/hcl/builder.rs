//! Document Builder
//!
//! Builds the body of one Terraform resource from an API payload through a
//! chain of field operations. Value thunks are evaluated lazily; a missing
//! optional field is skipped while a missing required field fails the
//! whole build. The first failure wins and every later operation becomes a
//! no-op.

use super::blocks::{BlockCondition, BlockKind, Cloud};
use super::interpolate;
use crate::error::ExportError;
use serde_json::{Map, Value};

/// Failure raised by a value thunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    /// The dot path does not exist (or is `null`) in the payload
    Missing(String),
    /// The value exists but cannot be used
    Invalid { field: String, message: String },
}

impl FieldError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }

    fn into_export_error(self) -> ExportError {
        match self {
            FieldError::Missing(field) => ExportError::RequiredFieldMissing { field },
            FieldError::Invalid { field, message } => ExportError::InvalidField { field, message },
        }
    }
}

pub type FieldResult<T = Value> = Result<T, FieldError>;

/// Dot-path lookups over API payloads
pub trait FieldAccess {
    /// Resolve `a.b.0.c`; numeric segments index into arrays
    fn get_path(&self, path: &str) -> Option<&Value>;

    fn require(&self, path: &str) -> FieldResult<&Value> {
        match self.get_path(path) {
            Some(Value::Null) | None => Err(FieldError::Missing(path.to_string())),
            Some(v) => Ok(v),
        }
    }

    fn require_str(&self, path: &str) -> FieldResult<&str> {
        self.require(path)?
            .as_str()
            .ok_or_else(|| FieldError::invalid(path, "expected a string"))
    }

    /// Cloned value at `path`
    fn value(&self, path: &str) -> FieldResult<Value> {
        self.require(path).cloned()
    }
}

impl FieldAccess for Value {
    fn get_path(&self, path: &str) -> Option<&Value> {
        if path.is_empty() {
            return None;
        }
        path.split('.').try_fold(self, |current, part| match current {
            Value::Array(items) => part.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => current.get(part),
        })
    }
}

impl FieldAccess for Map<String, Value> {
    fn get_path(&self, path: &str) -> Option<&Value> {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };
        let value = self.get(head)?;
        match rest {
            Some(rest) => value.get_path(rest),
            None => Some(value),
        }
    }
}

/// Builder for one resource body
#[derive(Debug)]
pub struct DocumentBuilder {
    label: String,
    fields: Map<String, Value>,
    failure: Option<ExportError>,
}

impl DocumentBuilder {
    pub fn new(resource_type: &str) -> Self {
        Self {
            label: resource_type.to_string(),
            fields: Map::new(),
            failure: None,
        }
    }

    /// Attach the object id to debug logs emitted while building
    pub fn for_object(mut self, object_id: &str) -> Self {
        self.label = format!("{} {}", self.label, object_id);
        self
    }

    fn failed(&self) -> bool {
        self.failure.is_some()
    }

    fn fail(&mut self, err: ExportError) {
        if self.failure.is_none() {
            tracing::debug!("{}: build failed: {}", self.label, err);
            self.failure = Some(err);
        }
    }

    /// Add a field whose absence fails the whole document
    pub fn required<F>(mut self, field: &str, value: F) -> Self
    where
        F: FnOnce() -> FieldResult,
    {
        if self.failed() {
            return self;
        }
        match value() {
            Ok(v) => {
                self.fields.insert(field.to_string(), v);
            }
            Err(e) => self.fail(e.into_export_error()),
        }
        self
    }

    /// Add a field that is silently omitted when missing
    pub fn optional<F>(mut self, field: &str, value: F) -> Self
    where
        F: FnOnce() -> FieldResult,
    {
        if self.failed() {
            return self;
        }
        match value() {
            Ok(v) => {
                self.fields.insert(field.to_string(), v);
            }
            Err(FieldError::Missing(path)) => {
                tracing::debug!("{}: permitting missing optional field {}", self.label, path);
            }
            Err(e) => self.fail(e.into_export_error()),
        }
        self
    }

    /// [`Self::optional`] applied only when `condition` holds
    pub fn optional_if<F>(self, condition: bool, field: &str, value: F) -> Self
    where
        F: FnOnce() -> FieldResult,
    {
        if condition {
            self.optional(field, value)
        } else {
            self
        }
    }

    /// Add one `dynamic` block wrapping an object value
    pub fn dynamic_block<F>(mut self, field: &str, value: F, condition: Option<BlockCondition>) -> Self
    where
        F: FnOnce() -> FieldResult,
    {
        if self.failed() {
            return self;
        }
        match value().and_then(|v| make_dynamic_block(field, v, condition.as_ref())) {
            Ok(block) => self.push_dynamic(vec![block]),
            Err(FieldError::Missing(path)) => {
                tracing::debug!("{}: permitting missing block field {}", self.label, path);
            }
            Err(e) => self.fail(e.into_export_error()),
        }
        self
    }

    /// [`Self::dynamic_block`] with name and guard taken from a known kind
    pub fn block<F>(self, kind: BlockKind, value: F) -> Self
    where
        F: FnOnce() -> FieldResult,
    {
        self.dynamic_block(kind.field_name(), value, kind.condition())
    }

    /// Add one `dynamic` block per list element.
    ///
    /// Any failure discards the blocks of this call only.
    pub fn dynamic_blocks<F>(mut self, field: &str, values: F, condition: Option<BlockCondition>) -> Self
    where
        F: FnOnce() -> FieldResult,
    {
        if self.failed() {
            return self;
        }
        let blocks = values().and_then(|v| match v {
            Value::Array(items) => items
                .into_iter()
                .map(|item| make_dynamic_block(field, item, condition.as_ref()))
                .collect::<FieldResult<Vec<_>>>(),
            other => Err(FieldError::invalid(
                field,
                format!("expected a list but got {other}"),
            )),
        });
        match blocks {
            Ok(blocks) => self.push_dynamic(blocks),
            Err(e) => tracing::debug!("{}: permitting block error in {}: {:?}", self.label, field, e),
        }
        self
    }

    /// Source every field from a `for_each` collection.
    ///
    /// With `just_local` the collection is referenced as `local.<name>`.
    /// A cloud guard turns the collection into `{}` on other clouds.
    pub fn for_each(mut self, collection: &str, fields: &[&str], cloud: Option<Cloud>, just_local: bool) -> Self {
        if self.failed() {
            return self;
        }
        let reference = if just_local {
            format!("local.{collection}")
        } else {
            collection.to_string()
        };
        let for_each = match cloud {
            Some(cloud) => interpolate::wrap(&format!("{} ? {} : {{}}", cloud.condition(), reference)),
            None => interpolate::wrap(&reference),
        };
        self.fields.insert("for_each".to_string(), Value::String(for_each));
        for field in fields {
            self.fields.insert(
                field.to_string(),
                Value::String(interpolate::wrap(&format!("each.value.{field}"))),
            );
        }
        self
    }

    fn push_dynamic(&mut self, blocks: Vec<Value>) {
        if blocks.is_empty() {
            return;
        }
        let entry = self
            .fields
            .entry("dynamic")
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(list) = entry {
            list.extend(blocks);
        }
    }

    /// The body, or the first failure met while building
    pub fn build(self) -> Result<Map<String, Value>, ExportError> {
        match self.failure {
            Some(err) => Err(err),
            None => Ok(self.fields),
        }
    }
}

fn make_dynamic_block(field: &str, value: Value, condition: Option<&BlockCondition>) -> FieldResult {
    let for_each = match condition {
        Some(c) => interpolate::ternary(&c.expression(), "[1]", "[]"),
        None => interpolate::wrap("[1]"),
    };
    match value {
        Value::Object(content) => {
            let mut body = Map::new();
            body.insert("for_each".to_string(), Value::String(for_each));
            body.insert("content".to_string(), Value::Object(content));
            let mut block = Map::new();
            block.insert(field.to_string(), Value::Object(body));
            Ok(Value::Object(block))
        }
        other => Err(FieldError::invalid(
            field,
            format!("expected an object but got {other}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pool() -> Value {
        json!({
            "instance_pool_name": "pool",
            "node_type_id": "i3.xlarge",
            "aws_attributes": {"availability": "SPOT"},
            "tags": [{"k": "a"}, {"k": "b"}],
        })
    }

    #[test]
    fn test_optional_missing_field_is_omitted() {
        let data = pool();
        let built = DocumentBuilder::new("databricks_instance_pool")
            .required("instance_pool_name", || data.value("instance_pool_name"))
            .optional("max_capacity", || data.value("max_capacity"))
            .build()
            .unwrap();
        assert!(!built.contains_key("max_capacity"));
        assert_eq!(built["instance_pool_name"], "pool");
    }

    #[test]
    fn test_required_missing_field_fails_build() {
        let data = pool();
        let err = DocumentBuilder::new("databricks_instance_pool")
            .required("max_capacity", || data.value("max_capacity"))
            .optional("node_type_id", || data.value("node_type_id"))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            ExportError::RequiredFieldMissing {
                field: "max_capacity".into()
            }
        );
    }

    #[test]
    fn test_cloud_block_guard() {
        let data = pool();
        let built = DocumentBuilder::new("databricks_instance_pool")
            .block(BlockKind::AwsAttributes, || data.value("aws_attributes"))
            .block(BlockKind::GcpAttributes, || data.value("gcp_attributes"))
            .build()
            .unwrap();
        assert_eq!(
            Value::Object(built),
            json!({
                "dynamic": [{
                    "aws_attributes": {
                        "for_each": "${upper(var.CLOUD) == \"AWS\" ? [1] : []}",
                        "content": {"availability": "SPOT"}
                    }
                }]
            })
        );
    }

    #[test]
    fn test_unconditional_block_and_non_object_failure() {
        let data = pool();
        let built = DocumentBuilder::new("t")
            .dynamic_block("disk", || Ok(json!({"size": 1})), None)
            .build()
            .unwrap();
        assert_eq!(built["dynamic"][0]["disk"]["for_each"], "${[1]}");

        let err = DocumentBuilder::new("t")
            .dynamic_block("name", || data.value("node_type_id"), None)
            .build()
            .unwrap_err();
        assert!(matches!(err, ExportError::InvalidField { .. }));
    }

    #[test]
    fn test_dynamic_blocks_error_only_aborts_that_call() {
        let data = pool();
        let built = DocumentBuilder::new("t")
            .dynamic_blocks("tag", || data.value("tags"), None)
            .dynamic_blocks("bad", || Ok(json!([{"a": 1}, "not-an-object"])), None)
            .dynamic_blocks("missing", || data.value("libraries"), None)
            .required("name", || data.value("instance_pool_name"))
            .build()
            .unwrap();
        let dynamic = built["dynamic"].as_array().unwrap();
        assert_eq!(dynamic.len(), 2);
        assert_eq!(dynamic[1]["tag"]["content"]["k"], "b");
        assert_eq!(built["name"], "pool");
    }

    #[test]
    fn test_for_each_references_collection() {
        let built = DocumentBuilder::new("databricks_instance_profile")
            .for_each("profiles", &["instance_profile_arn"], Some(Cloud::Aws), true)
            .build()
            .unwrap();
        assert_eq!(
            built["for_each"],
            "${upper(var.CLOUD) == \"AWS\" ? local.profiles : {}}"
        );
        assert_eq!(
            built["instance_profile_arn"],
            "${each.value.instance_profile_arn}"
        );
    }

    #[test]
    fn test_path_lookup_indexes_arrays() {
        let data = pool();
        assert_eq!(data.get_path("tags.1.k"), Some(&json!("b")));
        assert_eq!(data.get_path("tags.9.k"), None);
        assert!(data.require_str("aws_attributes").is_err());
    }
}
