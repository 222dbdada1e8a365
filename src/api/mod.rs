//! Workspace REST API access
//!
//! - [`auth`] - Workspace host and personal access token
//! - [`client`] - Client for `<host>/api/2.0` endpoints
//! - [`http`] - JSON request helpers
//!
//! # Example
//!
//! ```ignore
//! use dbsync::api::{WorkspaceClient, WorkspaceCredentials};
//!
//! async fn example() -> anyhow::Result<()> {
//!     let client = WorkspaceClient::new(WorkspaceCredentials::resolve(None, None)?)?;
//!     let pools = client.get("instance-pools/list", &[]).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod http;

pub use auth::WorkspaceCredentials;
pub use client::WorkspaceClient;
