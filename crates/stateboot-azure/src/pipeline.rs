//! Azure state backend pipeline
//!
//! Builds the [`Plan`] that provisions a Terraform state backend:
//!
//! ```text
//! providers ─┐
//! group ─────┼─> storage account ─> blob properties ───────────┐
//!            │          └─> blob data owner ─> container <──────┤
//!            ├─> key vault ─> crypto officer ─> key ────────────┤
//!            │        └──────────┐                              │
//!            └─> identity ─> identity key access ─> storage encryption
//! ```
//!
//! The encryption branch (key vault, key, identity) is optional. Ordering is
//! whatever the edges say; steps without an edge may run concurrently.

use crate::az::Principal;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use stateboot_core::{Plan, ResourceKind, RetryPolicy, Step, validate_name};
use std::time::Duration;

/// Step ids of the pipeline
pub mod steps {
    pub const REGISTER_STORAGE: &str = "register-storage-provider";
    pub const REGISTER_KEYVAULT: &str = "register-keyvault-provider";
    pub const REGISTER_IDENTITY: &str = "register-identity-provider";
    pub const RESOURCE_GROUP: &str = "resource-group";
    pub const STORAGE_ACCOUNT: &str = "storage-account";
    pub const BLOB_PROPERTIES: &str = "blob-service-properties";
    pub const BLOB_DATA_OWNER: &str = "blob-data-owner";
    pub const KEY_VAULT: &str = "key-vault";
    pub const KEY_VAULT_OFFICER: &str = "key-vault-crypto-officer";
    pub const ENCRYPTION_KEY: &str = "encryption-key";
    pub const IDENTITY: &str = "managed-identity";
    pub const IDENTITY_KEY_ACCESS: &str = "identity-key-access";
    pub const STORAGE_ENCRYPTION: &str = "storage-encryption";
    pub const CONTAINER: &str = "container";
}

const SOFT_DELETE_DAYS: &str = "7";

/// Role definitions used for the access bindings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleNames {
    /// Granted to the operator on the storage account
    pub blob_data: String,
    /// Granted to the operator on the key vault
    pub vault_admin: String,
    /// Granted to the managed identity on the key vault
    pub key_user: String,
}

impl Default for RoleNames {
    fn default() -> Self {
        Self {
            blob_data: "Storage Blob Data Owner".to_string(),
            vault_admin: "Key Vault Crypto Officer".to_string(),
            key_user: "Key Vault Crypto Service Encryption User".to_string(),
        }
    }
}

/// Customer-managed key setup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionParams {
    pub key_vault: String,
    pub key_name: String,
    pub identity: String,
}

/// Everything the pipeline needs to know up front
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapParams {
    pub location: String,
    pub resource_group: String,
    pub storage_account: String,
    pub container: String,
    /// Receives data-plane access to the state store
    pub principal: Principal,
    pub encryption: Option<EncryptionParams>,
    pub roles: RoleNames,
}

impl BootstrapParams {
    /// Check every name before anything is created
    pub fn validate(&self) -> Result<()> {
        validate_name(ResourceKind::ResourceGroup, &self.resource_group)?;
        validate_name(ResourceKind::StorageAccount, &self.storage_account)?;
        validate_name(ResourceKind::Container, &self.container)?;
        if let Some(encryption) = &self.encryption {
            validate_name(ResourceKind::KeyVault, &encryption.key_vault)?;
            validate_name(ResourceKind::Key, &encryption.key_name)?;
            validate_name(ResourceKind::ManagedIdentity, &encryption.identity)?;
        }
        Ok(())
    }
}

/// Role assignments need time to reach the data plane
pub fn rbac_propagation_policy() -> RetryPolicy {
    RetryPolicy::new(8, Duration::from_secs(15), Duration::from_secs(5))
}

fn register_provider(id: &str, namespace: &str) -> Step {
    Step::new(
        id,
        ["az", "provider", "register", "--namespace", "{{namespace}}", "--wait", "--output", "none"],
    )
    .describe(format!("Register resource provider {}", namespace))
    .literal("namespace", namespace)
    .idempotent()
}

fn role_assignment(id: &str, role: &str, principal_type: &str) -> Step {
    Step::new(
        id,
        [
            "az", "role", "assignment", "create",
            "--role", "{{role}}",
            "--assignee-object-id", "{{assignee}}",
            "--assignee-principal-type", "{{principal_type}}",
            "--scope", "{{scope}}",
            "--output", "none",
        ],
    )
    .literal("role", role)
    .literal("principal_type", principal_type)
    .retry(rbac_propagation_policy())
}

/// Build the provisioning plan
pub fn build_plan(params: &BootstrapParams) -> Result<Plan> {
    use steps::*;

    params.validate()?;

    let rg = params.resource_group.as_str();
    let location = params.location.as_str();
    let account = params.storage_account.as_str();

    let mut plan = vec![
        register_provider(REGISTER_STORAGE, "Microsoft.Storage"),
        Step::new(
            RESOURCE_GROUP,
            ["az", "group", "create", "--name", "{{rg}}", "--location", "{{location}}", "--output", "none"],
        )
        .describe(format!("Create resource group {}", rg))
        .literal("rg", rg)
        .literal("location", location)
        .idempotent(),
        Step::new(
            STORAGE_ACCOUNT,
            [
                "az", "storage", "account", "create",
                "--name", "{{account}}",
                "--resource-group", "{{rg}}",
                "--location", "{{location}}",
                "--sku", "Standard_LRS",
                "--kind", "StorageV2",
                "--allow-blob-public-access", "false",
                "--min-tls-version", "TLS1_2",
                "--https-only", "true",
                "--output", "json",
            ],
        )
        .describe(format!("Create storage account {}", account))
        .literal("account", account)
        .literal("rg", rg)
        .literal("location", location)
        .after(RESOURCE_GROUP)
        .after(REGISTER_STORAGE)
        .idempotent()
        .expect_field("id", "id")
        .follow_up([
            "az", "storage", "account", "show", "--name", "{{account}}", "--resource-group", "{{rg}}", "--output", "json",
        ]),
        Step::new(
            BLOB_PROPERTIES,
            [
                "az", "storage", "account", "blob-service-properties", "update",
                "--account-name", "{{account}}",
                "--resource-group", "{{rg}}",
                "--enable-versioning", "true",
                "--enable-delete-retention", "true",
                "--delete-retention-days", "{{days}}",
                "--enable-container-delete-retention", "true",
                "--container-delete-retention-days", "{{days}}",
                "--output", "none",
            ],
        )
        .describe("Enable blob versioning and soft delete")
        .literal("account", account)
        .literal("rg", rg)
        .literal("days", SOFT_DELETE_DAYS)
        .after(STORAGE_ACCOUNT),
        role_assignment(BLOB_DATA_OWNER, &params.roles.blob_data, params.principal.kind.as_arg())
            .describe(format!("Grant '{}' on the storage account", params.roles.blob_data))
            .literal("assignee", &params.principal.object_id)
            .output_of("scope", STORAGE_ACCOUNT, "id"),
    ];

    let mut container = Step::new(
        CONTAINER,
        [
            "az", "storage", "container", "create",
            "--name", "{{container}}",
            "--account-name", "{{account}}",
            "--auth-mode", "login",
            "--output", "none",
        ],
    )
    .describe(format!("Create blob container {}", params.container))
    .literal("container", &params.container)
    .literal("account", account)
    .after(BLOB_DATA_OWNER)
    .idempotent()
    .retry(rbac_propagation_policy());

    if let Some(encryption) = &params.encryption {
        plan.extend(encryption_steps(params, encryption));
        container = container.after(STORAGE_ENCRYPTION);
    }
    plan.push(container);

    Ok(Plan::new(plan)?)
}

fn encryption_steps(params: &BootstrapParams, encryption: &EncryptionParams) -> Vec<Step> {
    use steps::*;

    let rg = params.resource_group.as_str();
    let location = params.location.as_str();
    let vault = encryption.key_vault.as_str();

    vec![
        register_provider(REGISTER_KEYVAULT, "Microsoft.KeyVault"),
        register_provider(REGISTER_IDENTITY, "Microsoft.ManagedIdentity"),
        Step::new(
            KEY_VAULT,
            [
                "az", "keyvault", "create",
                "--name", "{{vault}}",
                "--resource-group", "{{rg}}",
                "--location", "{{location}}",
                "--enable-rbac-authorization", "true",
                "--enable-purge-protection", "true",
                "--retention-days", "{{days}}",
                "--output", "json",
            ],
        )
        .describe(format!("Create key vault {}", vault))
        .literal("vault", vault)
        .literal("rg", rg)
        .literal("location", location)
        .literal("days", SOFT_DELETE_DAYS)
        .after(RESOURCE_GROUP)
        .after(REGISTER_KEYVAULT)
        .idempotent()
        .expect_field("id", "id")
        .expect_field("uri", "properties.vaultUri")
        .follow_up([
            "az", "keyvault", "show", "--name", "{{vault}}", "--resource-group", "{{rg}}", "--output", "json",
        ]),
        role_assignment(KEY_VAULT_OFFICER, &params.roles.vault_admin, params.principal.kind.as_arg())
            .describe(format!("Grant '{}' on the key vault", params.roles.vault_admin))
            .literal("assignee", &params.principal.object_id)
            .output_of("scope", KEY_VAULT, "id"),
        Step::new(
            ENCRYPTION_KEY,
            [
                "az", "keyvault", "key", "create",
                "--vault-name", "{{vault}}",
                "--name", "{{key}}",
                "--kty", "RSA",
                "--size", "3072",
                "--output", "json",
            ],
        )
        .describe(format!("Create encryption key {}", encryption.key_name))
        .literal("vault", vault)
        .literal("key", &encryption.key_name)
        .after(KEY_VAULT_OFFICER)
        .expect_field("kid", "key.kid")
        .retry(rbac_propagation_policy()),
        Step::new(
            IDENTITY,
            [
                "az", "identity", "create",
                "--name", "{{identity}}",
                "--resource-group", "{{rg}}",
                "--location", "{{location}}",
                "--output", "json",
            ],
        )
        .describe(format!("Create managed identity {}", encryption.identity))
        .literal("identity", &encryption.identity)
        .literal("rg", rg)
        .literal("location", location)
        .after(RESOURCE_GROUP)
        .after(REGISTER_IDENTITY)
        .idempotent()
        .expect_field("id", "id")
        .expect_field("principal_id", "principalId")
        .expect_field("client_id", "clientId")
        .follow_up([
            "az", "identity", "show", "--name", "{{identity}}", "--resource-group", "{{rg}}", "--output", "json",
        ]),
        role_assignment(IDENTITY_KEY_ACCESS, &params.roles.key_user, "ServicePrincipal")
            .describe(format!("Grant '{}' to the managed identity", params.roles.key_user))
            .output_of("assignee", IDENTITY, "principal_id")
            .output_of("scope", KEY_VAULT, "id"),
        Step::new(
            STORAGE_ENCRYPTION,
            [
                "az", "storage", "account", "update",
                "--name", "{{account}}",
                "--resource-group", "{{rg}}",
                "--identity-type", "UserAssigned",
                "--user-identity-id", "{{identity_id}}",
                "--encryption-key-source", "Microsoft.Keyvault",
                "--encryption-key-vault", "{{vault_uri}}",
                "--encryption-key-name", "{{key}}",
                "--key-vault-user-identity-id", "{{identity_id}}",
                "--output", "none",
            ],
        )
        .describe("Encrypt the storage account with the customer-managed key")
        .literal("account", &params.storage_account)
        .literal("rg", rg)
        .literal("key", &encryption.key_name)
        .output_of("identity_id", IDENTITY, "id")
        .output_of("vault_uri", KEY_VAULT, "uri")
        .after(ENCRYPTION_KEY)
        .after(IDENTITY_KEY_ACCESS)
        // Both update the storage account.
        .after(BLOB_PROPERTIES)
        .retry(rbac_propagation_policy()),
    ]
}

#[cfg(test)]
mod tests {
    use super::steps::*;
    use super::*;
    use crate::az::PrincipalKind;
    use async_trait::async_trait;
    use stateboot_core::{
        BootstrapError, CommandExecutor, ExecutionResult, Orchestrator, StepState,
    };
    use std::sync::{Arc, Mutex};

    fn params(encrypted: bool) -> BootstrapParams {
        BootstrapParams {
            location: "westeurope".into(),
            resource_group: "rg-terraform-state".into(),
            storage_account: "tfstate12345".into(),
            container: "tfstate".into(),
            principal: Principal::new("user-oid", PrincipalKind::User),
            encryption: encrypted.then(|| EncryptionParams {
                key_vault: "kv-tfstate-12345".into(),
                key_name: "tfstate-cmk".into(),
                identity: "id-tfstate".into(),
            }),
            roles: RoleNames::default(),
        }
    }

    fn position(plan: &Plan, id: &str) -> usize {
        plan.order().iter().position(|s| *s == id).unwrap()
    }

    #[test]
    fn test_plan_without_encryption() {
        let plan = build_plan(&params(false)).unwrap();
        assert_eq!(
            plan.order(),
            vec![
                REGISTER_STORAGE,
                RESOURCE_GROUP,
                STORAGE_ACCOUNT,
                BLOB_PROPERTIES,
                BLOB_DATA_OWNER,
                CONTAINER
            ]
        );
        assert!(plan.get(KEY_VAULT).is_none());
    }

    #[test]
    fn test_plan_with_encryption_respects_edges() {
        let plan = build_plan(&params(true)).unwrap();
        assert_eq!(plan.len(), 14);
        for (before, after) in [
            (KEY_VAULT, KEY_VAULT_OFFICER),
            (KEY_VAULT_OFFICER, ENCRYPTION_KEY),
            (IDENTITY, IDENTITY_KEY_ACCESS),
            (KEY_VAULT, IDENTITY_KEY_ACCESS),
            (IDENTITY_KEY_ACCESS, STORAGE_ENCRYPTION),
            (BLOB_PROPERTIES, STORAGE_ENCRYPTION),
            (STORAGE_ENCRYPTION, CONTAINER),
            (BLOB_DATA_OWNER, CONTAINER),
        ] {
            assert!(
                position(&plan, before) < position(&plan, after),
                "{before} must precede {after}"
            );
        }
    }

    #[test]
    fn test_invalid_name_rejected_before_plan() {
        let mut bad = params(true);
        bad.storage_account = "Not_Valid".into();
        let err = build_plan(&bad).unwrap_err();
        assert!(err.to_string().contains("storage account"));

        let mut bad = params(true);
        bad.encryption.as_mut().unwrap().key_vault = "9vault".into();
        assert!(build_plan(&bad).is_err());
    }

    #[test]
    fn test_role_assignment_command() {
        let plan = build_plan(&params(false)).unwrap();
        let command = plan.get(BLOB_DATA_OWNER).unwrap().display_command();
        assert_eq!(
            command,
            "az role assignment create --role 'Storage Blob Data Owner' \
             --assignee-object-id user-oid --assignee-principal-type User \
             --scope <storage-account.id> --output none"
        );
    }

    /// Simulates the az CLI for a full run
    struct FakeAz {
        calls: Mutex<Vec<Vec<String>>>,
        container_denials: Mutex<u32>,
    }

    impl FakeAz {
        fn new(container_denials: u32) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                container_denials: Mutex::new(container_denials),
            })
        }

        fn calls_matching(&self, prefix: &[&str]) -> Vec<Vec<String>> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.iter().skip(1).zip(prefix).all(|(a, b)| a == b))
                .cloned()
                .collect()
        }
    }

    fn arg_after<'a>(argv: &'a [String], flag: &str) -> &'a str {
        let i = argv.iter().position(|a| a == flag).unwrap();
        &argv[i + 1]
    }

    #[async_trait]
    impl CommandExecutor for FakeAz {
        async fn execute(&self, argv: &[String]) -> ExecutionResult {
            self.calls.lock().unwrap().push(argv.to_vec());
            let words: Vec<&str> = argv.iter().skip(1).take(3).map(String::as_str).collect();
            match words.as_slice() {
                ["storage", "account", "create"] => ExecutionResult::success(
                    r#"{"id": "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Storage/storageAccounts/tfstate12345"}"#,
                ),
                ["keyvault", "create", ..] => ExecutionResult::success(
                    r#"{"id": "/vaults/kv", "properties": {"vaultUri": "https://kv.vault.azure.net/"}}"#,
                ),
                ["keyvault", "key", "create"] => {
                    ExecutionResult::success(r#"{"key": {"kid": "https://kv/keys/cmk/1"}}"#)
                }
                ["identity", "create", ..] => ExecutionResult::failure(
                    Some(1),
                    "ERROR: identity 'id-tfstate' already exists",
                ),
                ["identity", "show", ..] => ExecutionResult::success(
                    r#"{"id": "/identities/id-tfstate", "principalId": "mi-oid", "clientId": "mi-client"}"#,
                ),
                ["role", "assignment", "create"]
                    if arg_after(argv, "--assignee-object-id") == "user-oid" =>
                {
                    ExecutionResult::failure(
                        Some(1),
                        "(RoleAssignmentExists) The role assignment already exists.",
                    )
                }
                ["storage", "container", "create"] => {
                    let mut denials = self.container_denials.lock().unwrap();
                    if *denials > 0 {
                        *denials -= 1;
                        ExecutionResult::failure(
                            Some(1),
                            "You do not have the required permissions. ErrorCode:AuthorizationPermissionMismatch",
                        )
                    } else {
                        ExecutionResult::success(r#"{"created": true}"#)
                    }
                }
                _ => ExecutionResult::success(""),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_run_passes_identity_outputs() {
        let az = FakeAz::new(2);
        let plan = build_plan(&params(true)).unwrap();

        let report = Orchestrator::new(az.clone())
            .with_parallelism(3)
            .run(&plan)
            .await;
        assert!(report.is_success(), "{:?}", report.failure);

        let key_access = az
            .calls_matching(&["role", "assignment", "create"])
            .into_iter()
            .find(|c| arg_after(c, "--assignee-object-id") == "mi-oid")
            .expect("identity role assignment");
        assert_eq!(arg_after(&key_access, "--scope"), "/vaults/kv");

        let update = &az.calls_matching(&["storage", "account", "update"])[0];
        assert_eq!(arg_after(update, "--user-identity-id"), "/identities/id-tfstate");
        assert_eq!(
            arg_after(update, "--encryption-key-vault"),
            "https://kv.vault.azure.net/"
        );

        let container = report.record(CONTAINER).unwrap();
        assert_eq!(container.attempts, 3);
        assert_eq!(
            container.waits,
            vec![Duration::from_secs(15), Duration::from_secs(20)]
        );
        assert_eq!(
            report.outputs().get(IDENTITY, "client_id"),
            Some("mi-client")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_container_fails_after_propagation_budget() {
        let az = FakeAz::new(100);
        let plan = build_plan(&params(false)).unwrap();

        let report = Orchestrator::new(az.clone()).run(&plan).await;

        assert_eq!(report.state(CONTAINER), Some(StepState::Failed));
        assert_eq!(
            az.calls_matching(&["storage", "container", "create"]).len(),
            rbac_propagation_policy().max_attempts as usize
        );
        assert!(matches!(
            report.failure,
            Some(BootstrapError::StepFailed { ref step, .. }) if step == CONTAINER
        ));
    }
}
