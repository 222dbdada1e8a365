//! Export file layout
//!
//! ```text
//! <base>/terraform.tfvars
//! <base>/variables_env.sh
//! <base>/exports/mapped_variables.tf.json
//! <base>/exports/<folder>/<identifier>.tf.json
//! <base>/exports/<folder>/data/<artifact>
//! ```

use crate::error::ExportError;
use std::path::{Path, PathBuf};

pub const BASE_DIRECTORY: &str = "exports";
pub const TF_SUFFIX: &str = ".tf.json";
pub const DATA_DIRECTORY: &str = "data";
pub const MAPPED_VARIABLES_FILE: &str = "mapped_variables.tf.json";
pub const TFVARS_FILE: &str = "terraform.tfvars";
pub const ENV_FILE: &str = "variables_env.sh";

#[derive(Debug, Clone)]
pub struct ExportFiles {
    base: PathBuf,
}

impl ExportFiles {
    /// Layout rooted at the output directory `base`
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// `<base>/exports/<folder>/<identifier>.tf.json`
    pub fn resource_path(&self, folder: &str, identifier: &str) -> PathBuf {
        self.base
            .join(BASE_DIRECTORY)
            .join(folder)
            .join(format!("{identifier}{TF_SUFFIX}"))
    }

    /// `exports/<folder>/<identifier>.tf.json`
    pub fn relative_resource_path(folder: &str, identifier: &str) -> String {
        format!("{BASE_DIRECTORY}/{folder}/{identifier}{TF_SUFFIX}")
    }

    /// Local copy of an artifact under the folder's `data` directory
    pub fn data_path(&self, folder: &str, file_name: &str) -> PathBuf {
        self.base
            .join(BASE_DIRECTORY)
            .join(folder)
            .join(DATA_DIRECTORY)
            .join(file_name)
    }

    /// Shared variables file
    pub fn mapped_variables_path(&self) -> PathBuf {
        self.base.join(BASE_DIRECTORY).join(MAPPED_VARIABLES_FILE)
    }

    /// Variable values for `terraform apply`
    pub fn tfvars_path(&self) -> PathBuf {
        self.base.join(TFVARS_FILE)
    }

    /// The same values as `TF_VAR_` exports
    pub fn env_file_path(&self) -> PathBuf {
        self.base.join(ENV_FILE)
    }
}

/// Write a file, creating parent directories
pub async fn write_file(path: &Path, content: impl AsRef<[u8]>) -> Result<(), ExportError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ExportError::io(parent, e))?;
    }
    tracing::info!("Writing to path {}", path.display());
    tokio::fs::write(path, content)
        .await
        .map_err(|e| ExportError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let files = ExportFiles::new("/out");
        assert_eq!(
            files.resource_path("cluster", "databricks_cluster_a"),
            PathBuf::from("/out/exports/cluster/databricks_cluster_a.tf.json")
        );
        assert_eq!(
            ExportFiles::relative_resource_path("cluster", "databricks_cluster_a"),
            "exports/cluster/databricks_cluster_a.tf.json"
        );
        assert_eq!(
            files.data_path("notebook", "nb.py"),
            PathBuf::from("/out/exports/notebook/data/nb.py")
        );
        assert_eq!(files.tfvars_path(), PathBuf::from("/out/terraform.tfvars"));
        assert_eq!(
            files.mapped_variables_path(),
            PathBuf::from("/out/exports/mapped_variables.tf.json")
        );
    }

    #[tokio::test]
    async fn test_write_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exports/a/b.tf.json");
        write_file(&path, "{}").await.unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "{}");
    }
}
