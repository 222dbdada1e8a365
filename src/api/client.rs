//! Workspace Client
//!
//! Combines credentials and the HTTP helpers for `<host>/api/2.0` calls.

use super::auth::WorkspaceCredentials;
use super::http::WorkspaceHttpClient;
use anyhow::{Context, Result};
use serde_json::Value;

const API_PREFIX: &str = "api/2.0";

#[derive(Clone, Debug)]
pub struct WorkspaceClient {
    credentials: WorkspaceCredentials,
    http: WorkspaceHttpClient,
}

impl WorkspaceClient {
    pub fn new(credentials: WorkspaceCredentials) -> Result<Self> {
        let http = WorkspaceHttpClient::new().context("Failed to initialize workspace client")?;
        Ok(Self { credentials, http })
    }

    /// Workspace URL recorded on every exported item
    pub fn url(&self) -> String {
        self.credentials.workspace_url()
    }

    /// `<host>/api/2.0/<path>`
    pub fn api_url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.credentials.workspace_url(),
            API_PREFIX,
            path.trim_start_matches('/')
        )
    }

    /// GET `<host>/api/2.0/<path>`; the error names the request
    pub async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        self.http
            .get(&self.api_url(path), self.credentials.token(), query)
            .await
            .with_context(|| format!("GET {}", path))
    }
}
