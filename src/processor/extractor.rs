//! Mapped variable extraction
//!
//! Replaces literals found at configured dot paths with `${var.NAME}`
//! references and records `NAME = literal` on the document, so values that
//! differ between workspaces (node types, bucket names) become inputs of
//! the generated configuration.
//!
//! Paths are dot separated. Numeric segments index into lists and a single
//! `[*]` segment visits every element of the list at that position.

use super::grok::GrokPattern;
use super::Processor;
use crate::document::VersionedDocument;
use crate::error::ExportError;
use crate::hcl::interpolate;
use crate::naming::normalize_identifier;
use serde_json::Value;

const WILDCARD: &str = "[*]";

#[derive(Debug, Clone)]
pub struct MappedVariableExtractor {
    name: String,
    mappings: Vec<(String, GrokPattern)>,
}

impl MappedVariableExtractor {
    /// Compile every template up front; `None` means the whole value
    pub fn new<I, K>(name: impl Into<String>, mappings: I) -> Result<Self, ExportError>
    where
        I: IntoIterator<Item = (K, Option<String>)>,
        K: Into<String>,
    {
        let mappings = mappings
            .into_iter()
            .map(|(path, template)| {
                let pattern = match template {
                    Some(t) => GrokPattern::compile(&t)?,
                    None => GrokPattern::default(),
                };
                Ok((path.into(), pattern))
            })
            .collect::<Result<Vec<_>, ExportError>>()?;
        Ok(Self {
            name: name.into(),
            mappings,
        })
    }

    /// Rewrite `data` in place, returning the `(name, literal)` pairs found
    pub fn transform(&self, data: &mut Value) -> Result<Vec<(String, String)>, ExportError> {
        let mut found = Vec::new();
        for (path, pattern) in &self.mappings {
            for pointer in resolve(data, path)? {
                let Some(current) = data.pointer(&pointer) else {
                    continue;
                };
                if let Some(rewritten) = substitute(pattern, current, &mut found) {
                    if let Some(slot) = data.pointer_mut(&pointer) {
                        *slot = Value::String(rewritten);
                    }
                }
            }
        }
        Ok(found)
    }
}

impl Processor for MappedVariableExtractor {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, doc: &mut VersionedDocument) -> Result<(), ExportError> {
        let mut found = Vec::new();
        if doc.is_for_each() {
            let locals: Vec<_> = doc.local_variables().cloned().collect();
            for local in locals {
                let mut data = local.data;
                for entry in data.values_mut() {
                    found.extend(self.transform(entry)?);
                }
                doc.upsert_local_variable(local.name, data)?;
            }
        } else {
            let mut payload = doc.latest().clone();
            let vars = self.transform(&mut payload)?;
            if !vars.is_empty() {
                doc.modify(payload)?;
            }
            found.extend(vars);
        }
        for (name, literal) in found {
            doc.add_discovered_variable(name, literal);
        }
        Ok(())
    }
}

/// Grok each line of a scalar value; `Some` only when a line changed
fn substitute(pattern: &GrokPattern, value: &Value, found: &mut Vec<(String, String)>) -> Option<String> {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    let mut changed = false;
    let lines: Vec<String> = text
        .split('\n')
        .map(|line| match pattern.single_capture(line) {
            Some(m) if normalize_identifier(m.as_str()).is_empty() => {
                tracing::debug!("capture {:?} has no identifier characters, keeping literal", m.as_str());
                line.to_string()
            }
            Some(m) => {
                let name = normalize_identifier(m.as_str());
                found.push((name.clone(), m.as_str().to_string()));
                changed = true;
                format!(
                    "{}{}{}",
                    &line[..m.start()],
                    interpolate::variable(&name),
                    &line[m.end()..]
                )
            }
            None => line.to_string(),
        })
        .collect();
    changed.then(|| lines.join("\n"))
}

/// Expand a dot path into JSON pointers of present, non-null values
pub fn resolve(data: &Value, path: &str) -> Result<Vec<String>, ExportError> {
    let parts: Vec<&str> = path.split(WILDCARD).collect();
    let present = |pointer: &str| matches!(data.pointer(pointer), Some(v) if !v.is_null());
    match parts.as_slice() {
        [plain] => {
            let pointer = to_pointer(plain);
            Ok(if present(&pointer) { vec![pointer] } else { Vec::new() })
        }
        [prefix, suffix] => {
            let prefix = to_pointer(prefix.trim_end_matches('.'));
            let suffix = to_pointer(suffix.trim_start_matches('.'));
            let Some(Value::Array(items)) = data.pointer(&prefix) else {
                tracing::debug!("{path}: nothing to iterate at {prefix}");
                return Ok(Vec::new());
            };
            Ok((0..items.len())
                .map(|idx| format!("{prefix}/{idx}{suffix}"))
                .filter(|pointer| present(pointer))
                .collect())
        }
        _ => Err(ExportError::InvalidPath {
            path: path.to_string(),
            message: "only one [*] wildcard is allowed".to_string(),
        }),
    }
}

fn to_pointer(path: &str) -> String {
    path.split('.')
        .filter(|s| !s.is_empty())
        .map(|s| format!("/{}", s.replace('~', "~0").replace('/', "~1")))
        .collect()
}
