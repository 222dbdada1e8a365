//! Workspace credentials
//!
//! Only a host and a personal access token are read, either from CLI flags
//! or from `DATABRICKS_HOST` / `DATABRICKS_TOKEN`.

use anyhow::{bail, Context, Result};
use std::fmt;
use url::Url;

pub const HOST_ENV: &str = "DATABRICKS_HOST";
pub const TOKEN_ENV: &str = "DATABRICKS_TOKEN";

#[derive(Clone)]
pub struct WorkspaceCredentials {
    host: Url,
    token: String,
}

impl WorkspaceCredentials {
    /// Validate an http(s) host and a non-empty token
    pub fn new(host: &str, token: &str) -> Result<Self> {
        let host = Url::parse(host.trim_end_matches('/'))
            .with_context(|| format!("Invalid workspace host '{}'", host))?;
        if !matches!(host.scheme(), "http" | "https") {
            bail!("Workspace host must be an http(s) URL, got '{}'", host);
        }
        if token.trim().is_empty() {
            bail!("Workspace token is empty");
        }
        Ok(Self {
            host,
            token: token.trim().to_string(),
        })
    }

    /// Flags win over the environment
    pub fn resolve(host: Option<&str>, token: Option<&str>) -> Result<Self> {
        let host = match host {
            Some(h) => h.to_string(),
            None => std::env::var(HOST_ENV).with_context(|| format!("{} is not set", HOST_ENV))?,
        };
        let token = match token {
            Some(t) => t.to_string(),
            None => std::env::var(TOKEN_ENV).with_context(|| format!("{} is not set", TOKEN_ENV))?,
        };
        Self::new(&host, &token)
    }

    /// Workspace URL as recorded in reports, without trailing slash
    pub fn workspace_url(&self) -> String {
        self.host.as_str().trim_end_matches('/').to_string()
    }

    pub(crate) fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for WorkspaceCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkspaceCredentials")
            .field("host", &self.host.as_str())
            .field("token", &"****")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_hosts() {
        assert!(WorkspaceCredentials::new("not a url", "t").is_err());
        assert!(WorkspaceCredentials::new("ftp://ws.example.com", "t").is_err());
        assert!(WorkspaceCredentials::new("https://ws.example.com", "  ").is_err());
    }

    #[test]
    fn test_token_is_masked_in_debug() {
        let creds = WorkspaceCredentials::new("https://ws.example.com/", "dapi123").unwrap();
        assert!(!format!("{:?}", creds).contains("dapi123"));
        assert_eq!(creds.workspace_url(), "https://ws.example.com");
    }
}
