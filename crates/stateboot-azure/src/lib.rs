//! Azure backend for stateboot
//!
//! Builds the provisioning [`Plan`](stateboot_core::Plan) for an Azure
//! Terraform state store and talks to the `az` and `gh` CLIs.
//!
//! # Requirements
//!
//! - `az` CLI must be installed and logged in
//! - `gh` CLI is only needed when publishing repository secrets
//!
//! # Example
//!
//! ```ignore
//! use stateboot_azure::{AzCli, BootstrapParams, build_plan};
//! use stateboot_core::Orchestrator;
//!
//! let az = AzCli::new();
//! let account = az.account_show().await?;
//! let principal = az.current_principal(&account).await?;
//!
//! let plan = build_plan(&params)?;
//! let report = Orchestrator::new(az.executor()).run(&plan).await;
//! ```

pub mod az;
pub mod error;
pub mod naming;
pub mod pipeline;
pub mod secrets;

pub use az::{AccountInfo, AccountUser, AzCli, Principal, PrincipalKind};
pub use error::{AzureError, Result};
pub use naming::{key_vault_name, storage_account_name, with_random_suffix};
pub use pipeline::{
    BootstrapParams, EncryptionParams, RoleNames, build_plan, rbac_propagation_policy, steps,
};
pub use secrets::{GhSecretPublisher, SecretOutcome, SecretSink, backend_secrets};
