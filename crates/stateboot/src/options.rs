//! Command-line overrides on top of the settings file

use clap::Args;
use stateboot_azure::RoleNames;
use stateboot_config::Settings;
use stateboot_core::{ErrorClassifier, RetryPolicy};
use std::path::PathBuf;
use std::time::Duration;

/// Flags shared by `bootstrap` and `plan`
#[derive(Args, Debug, Clone, Default)]
pub struct ResourceArgs {
    /// Azure region
    #[arg(short, long)]
    pub location: Option<String>,
    /// Resource group that holds the state backend
    #[arg(short = 'g', long)]
    pub resource_group: Option<String>,
    /// Blob container for state files
    #[arg(long)]
    pub container: Option<String>,
    /// Prefix for the generated storage account name
    #[arg(long)]
    pub storage_prefix: Option<String>,
    /// Exact storage account name instead of a generated one
    #[arg(long)]
    pub storage_account: Option<String>,
    /// Exact key vault name instead of a generated one
    #[arg(long)]
    pub key_vault: Option<String>,
    /// Environments to write backend.conf for (comma separated)
    #[arg(short, long, value_delimiter = ',')]
    pub environments: Vec<String>,
    /// Directory that contains one folder per environment
    #[arg(long)]
    pub terraform_dir: Option<PathBuf>,
    /// Skip the key vault, key and managed identity
    #[arg(long)]
    pub no_encryption: bool,
    /// Maximum number of steps running at once
    #[arg(short = 'j', long)]
    pub parallelism: Option<usize>,
    /// Subscription to switch to before provisioning
    #[arg(long, env = "AZURE_SUBSCRIPTION_ID")]
    pub subscription: Option<String>,
}

impl ResourceArgs {
    /// Settings with every given flag applied
    pub fn apply(&self, mut settings: Settings) -> Settings {
        if let Some(location) = &self.location {
            settings.location = location.clone();
        }
        if let Some(resource_group) = &self.resource_group {
            settings.resource_group = resource_group.clone();
        }
        if let Some(container) = &self.container {
            settings.container = container.clone();
        }
        if let Some(prefix) = &self.storage_prefix {
            settings.storage_account_prefix = prefix.clone();
        }
        if !self.environments.is_empty() {
            settings.environments = self.environments.clone();
        }
        if let Some(dir) = &self.terraform_dir {
            settings.terraform_dir = dir.clone();
        }
        if self.no_encryption {
            settings.encryption.enabled = false;
        }
        if let Some(parallelism) = self.parallelism {
            settings.parallelism = parallelism.max(1);
        }
        if self.subscription.is_some() {
            settings.subscription = self.subscription.clone();
        }
        settings
    }
}

pub fn retry_policy(settings: &Settings) -> RetryPolicy {
    RetryPolicy::new(
        settings.retry.max_attempts,
        Duration::from_secs(settings.retry.base_delay_secs),
        Duration::from_secs(settings.retry.increment_secs),
    )
}

/// Built-in rules followed by the configured patterns
pub fn classifier(settings: &Settings) -> ErrorClassifier {
    ErrorClassifier::builtin()
        .with_ignorable(settings.classifier.ignorable.iter())
        .with_retryable(settings.classifier.retryable.iter())
}

pub fn role_names(settings: &Settings) -> RoleNames {
    let defaults = RoleNames::default();
    let roles = &settings.roles;
    RoleNames {
        blob_data: roles.blob_data.clone().unwrap_or(defaults.blob_data),
        vault_admin: roles.vault_admin.clone().unwrap_or(defaults.vault_admin),
        key_user: roles.key_user.clone().unwrap_or(defaults.key_user),
    }
}
