//! Dedup lanes
//!
//! Variables shared across documents are collected after every document
//! has been emitted. The variable lane is keyed by name and keeps the first
//! declaration it sees; the parameter lane keeps every distinct
//! `(name, default)` pair for `terraform.tfvars` and `variables_env.sh`.

use crate::document::{Variable, VersionedDocument};
use crate::error::ExportError;
use crate::hcl::TerraformJson;
use std::collections::{BTreeMap, HashSet};

/// Variables of one successfully emitted document
#[derive(Debug, Clone, Default)]
pub struct LaneInput {
    pub discovered: Vec<Variable>,
    pub resource: Vec<Variable>,
}

impl LaneInput {
    /// `None` for documents with errors; they never reach the lanes
    pub fn from_document(doc: &VersionedDocument) -> Option<Self> {
        if doc.has_errors() {
            return None;
        }
        Some(Self {
            discovered: doc.discovered_variables().to_vec(),
            resource: doc.resource_variables().to_vec(),
        })
    }
}

/// Shared variables, first declaration wins
#[derive(Debug, Default)]
pub struct VariableLane {
    seen: BTreeMap<String, Option<String>>,
    shared: Vec<Variable>,
    collisions: Vec<ExportError>,
}

impl VariableLane {
    /// Offer the discovered, then the resource variables of one document
    pub fn admit(&mut self, input: &LaneInput) {
        for variable in &input.discovered {
            self.offer(variable, true);
        }
        for variable in &input.resource {
            self.offer(variable, false);
        }
    }

    fn offer(&mut self, variable: &Variable, shared: bool) {
        match self.seen.get(&variable.name) {
            Some(existing) if *existing != variable.default => {
                let collision = ExportError::VariableNameCollision {
                    name: variable.name.clone(),
                    existing: existing.clone(),
                    rejected: variable.default.clone(),
                };
                tracing::warn!("{}", collision);
                self.collisions.push(collision);
            }
            Some(_) => {}
            None => {
                self.seen.insert(variable.name.clone(), variable.default.clone());
                if shared {
                    self.shared.push(variable.clone());
                }
            }
        }
    }

    /// Variables written to `mapped_variables.tf.json`
    pub fn shared(&self) -> &[Variable] {
        &self.shared
    }

    /// Rejected declarations, one per differing default
    pub fn collisions(&self) -> &[ExportError] {
        &self.collisions
    }

    /// Render the shared variables file
    pub fn to_terraform_json(&self) -> Result<String, ExportError> {
        let mut doc = TerraformJson::new();
        for variable in &self.shared {
            doc.add_variable(&variable.name, variable.to_body())?;
        }
        Ok(doc.to_json())
    }
}

/// Exactly deduplicated `(name, default)` pairs, in arrival order
#[derive(Debug, Default)]
pub struct ParameterLane {
    seen: HashSet<(String, Option<String>)>,
    parameters: Vec<(String, Option<String>)>,
}

impl ParameterLane {
    /// Add every new `(name, default)` pair of one document
    pub fn admit(&mut self, input: &LaneInput) {
        for variable in input.discovered.iter().chain(&input.resource) {
            let key = (variable.name.clone(), variable.default.clone());
            if self.seen.insert(key.clone()) {
                self.parameters.push(key);
            }
        }
    }

    pub fn parameters(&self) -> &[(String, Option<String>)] {
        &self.parameters
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// `name="value"` lines
    pub fn to_tfvars(&self) -> String {
        self.parameters
            .iter()
            .map(|(name, value)| format!("{}=\"{}\"\n", name, escape_hcl(value.as_deref().unwrap_or_default())))
            .collect()
    }

    /// `export TF_VAR_name="value"` lines
    pub fn to_env_file(&self) -> String {
        self.parameters
            .iter()
            .map(|(name, value)| {
                format!(
                    "export TF_VAR_{}=\"{}\"\n",
                    name,
                    escape_shell(value.as_deref().unwrap_or_default())
                )
            })
            .collect()
    }
}

fn escape_hcl(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn escape_shell(value: &str) -> String {
    value
        .chars()
        .flat_map(|c| match c {
            '\\' | '"' | '$' | '`' => vec!['\\', c],
            other => vec![other],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(discovered: &[(&str, &str)], resource: &[(&str, Option<&str>)]) -> LaneInput {
        LaneInput {
            discovered: discovered
                .iter()
                .map(|(n, v)| Variable::new(*n, Some(v.to_string())))
                .collect(),
            resource: resource
                .iter()
                .map(|(n, v)| Variable::new(*n, v.map(str::to_string)))
                .collect(),
        }
    }

    #[test]
    fn test_first_seen_wins() {
        let mut lane = VariableLane::default();
        lane.admit(&input(&[("node", "i3.xlarge")], &[]));
        lane.admit(&input(&[("node", "m5.large")], &[]));
        lane.admit(&input(&[("node", "i3.xlarge")], &[]));
        assert_eq!(lane.shared().len(), 1);
        assert_eq!(lane.shared()[0].default.as_deref(), Some("i3.xlarge"));
        assert_eq!(lane.collisions().len(), 1);
    }

    #[test]
    fn test_resource_variables_collide_but_are_not_shared() {
        let mut lane = VariableLane::default();
        lane.admit(&input(&[], &[("token", None)]));
        lane.admit(&input(&[("token", "x")], &[]));
        assert!(lane.shared().is_empty());
        assert_eq!(lane.collisions().len(), 1);
    }

    #[test]
    fn test_parameters_dedup_exact_pairs() {
        let mut lane = ParameterLane::default();
        lane.admit(&input(&[("a", "1"), ("a", "2")], &[("t", None)]));
        lane.admit(&input(&[("a", "1")], &[]));
        assert_eq!(lane.parameters().len(), 3);
        assert_eq!(lane.to_tfvars(), "a=\"1\"\na=\"2\"\nt=\"\"\n");
        assert!(lane.to_env_file().starts_with("export TF_VAR_a=\"1\"\n"));
    }

    #[test]
    fn test_values_are_escaped() {
        let mut lane = ParameterLane::default();
        lane.admit(&input(&[("q", "say \"hi\" $HOME")], &[]));
        assert_eq!(lane.to_tfvars(), "q=\"say \\\"hi\\\" $HOME\"\n");
        assert_eq!(lane.to_env_file(), "export TF_VAR_q=\"say \\\"hi\\\" \\$HOME\"\n");
    }

    #[test]
    fn test_shared_variables_render() {
        let mut lane = VariableLane::default();
        lane.admit(&input(&[("b", "2"), ("a", "1")], &[]));
        let json: serde_json::Value = serde_json::from_str(&lane.to_terraform_json().unwrap()).unwrap();
        assert_eq!(json["variable"]["a"]["default"], "1");
        assert_eq!(json["variable"]["b"]["default"], "2");
    }
}
