//! Export errors
//!
//! Every stage of the export pipeline returns these errors instead of
//! panicking. Per-document failures are attached to the document that
//! caused them; only [`ExportError::DuplicateIdentifier`] and
//! [`ExportError::StuckPipeline`] abort a run.

use thiserror::Error;

/// Errors produced while exporting resources
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExportError {
    /// A remote call failed for one source or one object
    #[error("failed to fetch {resource}: {message}")]
    Fetch { resource: String, message: String },

    /// A field declared as required was absent from the API payload
    #[error("required field `{field}` is missing")]
    RequiredFieldMissing { field: String },

    /// A field was present but had an unusable shape
    #[error("invalid value for field `{field}`: {message}")]
    InvalidField { field: String, message: String },

    /// Two declarations of the same variable disagree on the default
    #[error("variable `{name}` already declared with default {existing:?}, rejected {rejected:?}")]
    VariableNameCollision {
        name: String,
        existing: Option<String>,
        rejected: Option<String>,
    },

    /// Two documents claim the same output path
    #[error("duplicate identifier `{identifier}` would overwrite {path}")]
    DuplicateIdentifier { identifier: String, path: String },

    /// A document that already failed was modified
    #[error("document `{identifier}` has errors, lineage is frozen")]
    LineageFrozen { identifier: String },

    /// A dot path could not be interpreted
    #[error("invalid dot path `{path}`: {message}")]
    InvalidPath { path: String, message: String },

    /// A grok template could not be compiled
    #[error("invalid pattern `{pattern}`: {message}")]
    InvalidPattern { pattern: String, message: String },

    /// Side content of a document could not be fetched
    #[error("failed to fetch artifact {remote_path}: {message}")]
    Artifact { remote_path: String, message: String },

    /// Writing an output file failed
    #[error("failed to write {path}: {message}")]
    Io { path: String, message: String },

    /// The engine stopped accepting documents
    #[error("pipeline closed before {resource} was handed over")]
    Closed { resource: String },

    /// The worker pool never drained
    #[error("pipeline stuck: {pending} documents still pending after {attempts} drain checks")]
    StuckPipeline { pending: usize, attempts: u32 },
}

impl ExportError {
    pub fn fetch(resource: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Fetch {
            resource: resource.into(),
            message: err.to_string(),
        }
    }

    pub fn io(path: &std::path::Path, err: impl std::fmt::Display) -> Self {
        Self::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }

    /// Whether this error must abort the whole run
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::DuplicateIdentifier { .. } | Self::StuckPipeline { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_run_level_errors_are_fatal() {
        let dup = ExportError::DuplicateIdentifier {
            identifier: "a".into(),
            path: "exports/cluster/a.tf.json".into(),
        };
        assert!(dup.is_fatal());
        assert!(ExportError::StuckPipeline { pending: 1, attempts: 3 }.is_fatal());
        assert!(!ExportError::RequiredFieldMissing { field: "x".into() }.is_fatal());
        assert!(!ExportError::fetch("clusters", "timeout").is_fatal());
    }

    #[test]
    fn test_messages_name_the_field() {
        let err = ExportError::RequiredFieldMissing {
            field: "spark_version".into(),
        };
        assert_eq!(err.to_string(), "required field `spark_version` is missing");
    }
}
