//! Azure provider error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AzureError {
    #[error("az not found. Please install the Azure CLI: https://aka.ms/azure-cli")]
    AzNotFound,

    #[error("Not logged in to Azure: {0}")]
    NotLoggedIn(String),

    #[error("az command failed: {0}")]
    CommandFailed(String),

    #[error("Could not generate a valid {kind} name from prefix '{prefix}': {reason}")]
    InvalidPrefix {
        kind: String,
        prefix: String,
        reason: String,
    },

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Bootstrap(#[from] stateboot_core::BootstrapError),
}

pub type Result<T> = std::result::Result<T, AzureError>;
