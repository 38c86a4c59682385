//! Settings file model
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! usable configuration.

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub location: String,
    pub resource_group: String,
    pub container: String,
    /// Storage account names are `<prefix><5 digits>`
    pub storage_account_prefix: String,
    /// One `backend.conf` is written per environment
    pub environments: Vec<String>,
    pub terraform_dir: PathBuf,
    /// Subscription to switch to before provisioning
    pub subscription: Option<String>,
    /// Maximum number of steps running at once
    pub parallelism: usize,
    pub retry: RetrySettings,
    pub classifier: ClassifierSettings,
    pub encryption: EncryptionSettings,
    pub roles: RoleSettings,
    pub github: GithubSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            location: "westeurope".to_string(),
            resource_group: "rg-terraform-state".to_string(),
            container: "tfstate".to_string(),
            storage_account_prefix: "tfstate".to_string(),
            environments: vec!["test".to_string(), "prod".to_string()],
            terraform_dir: PathBuf::from("terraform"),
            subscription: None,
            parallelism: 2,
            retry: RetrySettings::default(),
            classifier: ClassifierSettings::default(),
            encryption: EncryptionSettings::default(),
            roles: RoleSettings::default(),
            github: GithubSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_secs: u64,
    pub increment_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_secs: 10,
            increment_secs: 5,
        }
    }
}

/// Extra error patterns, checked after the built-in rules
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClassifierSettings {
    pub retryable: Vec<String>,
    pub ignorable: Vec<String>,
}

/// Customer-managed key for the storage account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EncryptionSettings {
    pub enabled: bool,
    /// Key vault names are `<prefix>-<5 digits>`
    pub key_vault_prefix: String,
    pub key_name: String,
    pub identity: String,
}

impl Default for EncryptionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            key_vault_prefix: "kv-tfstate".to_string(),
            key_name: "tfstate-cmk".to_string(),
            identity: "id-tfstate".to_string(),
        }
    }
}

/// Role definition overrides; unset fields keep the built-in role
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RoleSettings {
    pub blob_data: Option<String>,
    pub vault_admin: Option<String>,
    pub key_user: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GithubSettings {
    /// Publish backend coordinates as repository secrets
    pub publish_secrets: bool,
    /// `owner/name`; the repository of the current directory when unset
    pub repo: Option<String>,
}

impl Settings {
    /// Parse settings from YAML text
    pub fn from_yaml(text: &str, path: &Path) -> Result<Self> {
        // serde_yaml reads an empty document as null
        let is_blank = text
            .lines()
            .map(str::trim)
            .all(|line| line.is_empty() || line.starts_with('#'));
        let settings: Settings = if is_blank {
            Settings::default()
        } else {
            serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a file
    pub fn load_from(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text, path)
    }

    fn validate(&self) -> Result<()> {
        if self.environments.is_empty() {
            return Err(ConfigError::Invalid {
                field: "environments",
                reason: "at least one environment is required".to_string(),
            });
        }
        if self.parallelism == 0 {
            return Err(ConfigError::Invalid {
                field: "parallelism",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "retry.max_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        // Each retry must wait longer than the one before it.
        if self.retry.increment_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "retry.increment_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
