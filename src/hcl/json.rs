//! Terraform JSON document writer
//!
//! Collects `variable`, `locals` and `resource` sections and renders them
//! as pretty-printed JSON with sorted keys. Empty sections are left out.

use crate::error::ExportError;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Default, Clone)]
pub struct TerraformJson {
    variables: BTreeMap<String, Value>,
    locals: BTreeMap<String, Value>,
    resources: BTreeMap<String, BTreeMap<String, Value>>,
}

impl TerraformJson {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a variable; a second declaration of `name` is a collision
    pub fn add_variable(&mut self, name: &str, body: Value) -> Result<&mut Self, ExportError> {
        if let Some(existing) = self.variables.get(name) {
            return Err(ExportError::VariableNameCollision {
                name: name.to_string(),
                existing: default_of(existing),
                rejected: default_of(&body),
            });
        }
        self.variables.insert(name.to_string(), body);
        Ok(self)
    }

    pub fn add_locals(&mut self, name: &str, body: Value) -> &mut Self {
        self.locals.insert(name.to_string(), body);
        self
    }

    /// Add a resource; a repeated identifier of the same type is rejected
    pub fn add_resource(
        &mut self,
        resource_type: &str,
        resource_id: &str,
        body: Value,
    ) -> Result<&mut Self, ExportError> {
        let of_type = self.resources.entry(resource_type.to_string()).or_default();
        if of_type.contains_key(resource_id) {
            return Err(ExportError::DuplicateIdentifier {
                identifier: resource_id.to_string(),
                path: format!("resource.{resource_type}"),
            });
        }
        of_type.insert(resource_id.to_string(), body);
        Ok(self)
    }

    /// JSON document with only the non-empty top level sections
    pub fn to_value(&self) -> Value {
        let mut root = Map::new();
        if !self.variables.is_empty() {
            root.insert("variable".to_string(), to_object(&self.variables));
        }
        if !self.locals.is_empty() {
            root.insert("locals".to_string(), to_object(&self.locals));
        }
        if !self.resources.is_empty() {
            let resources = self
                .resources
                .iter()
                .map(|(kind, by_id)| (kind.clone(), to_object(by_id)))
                .collect();
            root.insert("resource".to_string(), Value::Object(resources));
        }
        Value::Object(root)
    }

    pub fn to_json(&self) -> String {
        // serde_json maps keep keys sorted, matching the generated files
        serde_json::to_string_pretty(&self.to_value()).unwrap_or_else(|_| "{}".to_string())
    }
}

fn to_object(map: &BTreeMap<String, Value>) -> Value {
    Value::Object(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
}

fn default_of(body: &Value) -> Option<String> {
    body.get("default").map(|v| match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}
