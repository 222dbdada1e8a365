//! Terraform JSON generation
//!
//! - [`builder`] - Builds one resource body from an API payload
//! - [`blocks`] - Known dynamic block kinds and cloud guards
//! - [`interpolate`] - `${...}` interpolation markers
//! - [`json`] - Assembles the final `*.tf.json` document

pub mod blocks;
pub mod builder;
pub mod interpolate;
pub mod json;

pub use blocks::{BlockCondition, BlockKind, Cloud};
pub use builder::{DocumentBuilder, FieldAccess, FieldError, FieldResult};
pub use json::TerraformJson;
