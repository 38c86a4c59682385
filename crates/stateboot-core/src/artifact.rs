//! Backend configuration artifacts
//!
//! Writes one `backend.conf` per environment once provisioning succeeded.
//! Writing is idempotent: the same coordinates always produce the same
//! bytes, so a re-run overwrites with identical content.

use crate::error::{BootstrapError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

const BACKEND_FILE: &str = "backend.conf";

/// Connection coordinates of the provisioned state store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub resource_group_name: String,
    pub storage_account_name: String,
    pub container_name: String,
    pub subscription_id: Option<String>,
    pub use_azuread_auth: bool,
}

impl BackendConfig {
    /// State blob name for an environment
    pub fn state_key(environment: &str) -> String {
        format!("{}.terraform.tfstate", environment)
    }

    /// Render the `key = "value"` block for one environment
    pub fn render(&self, environment: &str) -> String {
        let mut entries: Vec<(&str, String)> = vec![
            ("resource_group_name", quote(&self.resource_group_name)),
            ("storage_account_name", quote(&self.storage_account_name)),
            ("container_name", quote(&self.container_name)),
            ("key", quote(&Self::state_key(environment))),
        ];
        if let Some(subscription_id) = &self.subscription_id {
            entries.push(("subscription_id", quote(subscription_id)));
        }
        entries.push(("use_azuread_auth", self.use_azuread_auth.to_string()));

        let width = entries.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
        entries
            .iter()
            .map(|(k, v)| format!("{:<width$} = {}\n", k, v, width = width))
            .collect()
    }
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Persists backend configuration for a set of environments
#[async_trait]
pub trait ArtifactWriter: Send + Sync {
    /// Write the artifacts, returning the paths written
    async fn write(&self, config: &BackendConfig, environments: &[String]) -> Result<Vec<PathBuf>>;
}

/// Writes `<root>/<environment>/backend.conf`
#[derive(Debug, Clone)]
pub struct BackendFileWriter {
    root: PathBuf,
}

impl BackendFileWriter {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, environment: &str) -> PathBuf {
        self.root.join(environment).join(BACKEND_FILE)
    }
}

#[async_trait]
impl ArtifactWriter for BackendFileWriter {
    async fn write(&self, config: &BackendConfig, environments: &[String]) -> Result<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(environments.len());
        for environment in environments {
            let path = self.path_for(environment);
            let artifact_error = |source| BootstrapError::Artifact {
                path: path.display().to_string(),
                source,
            };

            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir).await.map_err(artifact_error)?;
            }
            fs::write(&path, config.render(environment))
                .await
                .map_err(artifact_error)?;

            tracing::debug!("Wrote backend config: {}", path.display());
            written.push(path);
        }
        Ok(written)
    }
}
