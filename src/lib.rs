//! Export Databricks workspace objects as Terraform JSON.
//!
//! - [`api`] - Workspace REST client
//! - [`config`] - Export configuration file
//! - [`source`] - One producer per object kind
//! - [`processor`] - Per-document transforms, such as variable extraction
//! - [`pipeline`] - Concurrent engine, output layout and dedup lanes
//! - [`report`] - Per-item run report

pub mod api;
pub mod config;
pub mod document;
pub mod error;
pub mod hcl;
pub mod naming;
pub mod pipeline;
pub mod processor;
pub mod report;
pub mod source;

pub use error::ExportError;

/// Version injected at compile time via DBSYNC_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("DBSYNC_VERSION") {
    Some(v) => v,
    None => "dev",
};
