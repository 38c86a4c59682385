//! az CLI wrapper
//!
//! Login-context queries that run before a plan is built. Provisioning
//! commands themselves go through the orchestrator.

use crate::error::{AzureError, Result};
use serde::{Deserialize, Serialize};
use stateboot_core::{CommandExecutor, ExecutionResult, ProcessExecutor};
use std::sync::Arc;

/// az CLI wrapper
pub struct AzCli {
    executor: Arc<dyn CommandExecutor>,
}

impl AzCli {
    pub fn new() -> Self {
        Self::with_executor(Arc::new(ProcessExecutor::new().env("AZURE_CORE_ONLY_SHOW_ERRORS", "true")))
    }

    pub fn with_executor(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }

    /// The executor used for every az invocation
    pub fn executor(&self) -> Arc<dyn CommandExecutor> {
        Arc::clone(&self.executor)
    }

    async fn execute(&self, args: &[&str]) -> ExecutionResult {
        let argv: Vec<String> = std::iter::once("az")
            .chain(args.iter().copied())
            .map(String::from)
            .collect();
        self.executor.execute(&argv).await
    }

    /// Run an az command and return trimmed stdout
    async fn run_command(&self, args: &[&str]) -> Result<String> {
        let result = self.execute(args).await;
        if !result.is_success() {
            return Err(AzureError::CommandFailed(result.error_text()));
        }
        Ok(result.stdout.trim().to_string())
    }

    /// Check that az is installed
    pub async fn check_installed(&self) -> Result<()> {
        let result = self.execute(&["version", "--output", "json"]).await;
        if result.status.is_none() {
            return Err(AzureError::AzNotFound);
        }
        Ok(())
    }

    /// Current login context
    pub async fn account_show(&self) -> Result<AccountInfo> {
        let result = self.execute(&["account", "show", "--output", "json"]).await;
        if !result.is_success() {
            return Err(AzureError::NotLoggedIn(result.error_text()));
        }
        Ok(serde_json::from_str(&result.stdout)?)
    }

    /// Interactive browser login
    pub async fn login(&self) -> Result<()> {
        self.run_command(&["login", "--output", "none"]).await?;
        Ok(())
    }

    /// Switch the active subscription
    pub async fn set_subscription(&self, subscription: &str) -> Result<()> {
        self.run_command(&["account", "set", "--subscription", subscription])
            .await?;
        Ok(())
    }

    /// Object id of the logged-in principal, used for role assignments
    pub async fn current_principal(&self, account: &AccountInfo) -> Result<Principal> {
        let is_service_principal = account
            .user
            .as_ref()
            .is_some_and(|u| u.user_type == "servicePrincipal");

        if is_service_principal {
            let app_id = account
                .user
                .as_ref()
                .map(|u| u.name.as_str())
                .unwrap_or_default();
            let object_id = self
                .run_command(&["ad", "sp", "show", "--id", app_id, "--query", "id", "--output", "tsv"])
                .await?;
            Ok(Principal::new(object_id, PrincipalKind::ServicePrincipal))
        } else {
            let object_id = self
                .run_command(&["ad", "signed-in-user", "show", "--query", "id", "--output", "tsv"])
                .await?;
            Ok(Principal::new(object_id, PrincipalKind::User))
        }
    }
}

impl Default for AzCli {
    fn default() -> Self {
        Self::new()
    }
}

/// Output of `az account show`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountInfo {
    /// Subscription id
    pub id: String,

    /// Subscription name
    pub name: String,

    #[serde(rename = "tenantId")]
    pub tenant_id: Option<String>,

    pub user: Option<AccountUser>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountUser {
    pub name: String,

    #[serde(rename = "type")]
    pub user_type: String,
}

/// Kind of principal a role is assigned to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrincipalKind {
    User,
    ServicePrincipal,
}

impl PrincipalKind {
    /// Value for `--assignee-principal-type`
    pub fn as_arg(&self) -> &'static str {
        match self {
            PrincipalKind::User => "User",
            PrincipalKind::ServicePrincipal => "ServicePrincipal",
        }
    }
}

/// A directory object that receives role assignments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub object_id: String,
    pub kind: PrincipalKind,
}

impl Principal {
    pub fn new(object_id: impl Into<String>, kind: PrincipalKind) -> Self {
        Self {
            object_id: object_id.into(),
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FixedExecutor {
        results: Mutex<Vec<ExecutionResult>>,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl FixedExecutor {
        fn new(results: Vec<ExecutionResult>) -> Arc<Self> {
            Arc::new(Self {
                results: Mutex::new(results),
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CommandExecutor for FixedExecutor {
        async fn execute(&self, argv: &[String]) -> ExecutionResult {
            self.calls.lock().unwrap().push(argv.to_vec());
            self.results.lock().unwrap().remove(0)
        }
    }

    const ACCOUNT: &str = r#"{
        "id": "0000-sub",
        "name": "Production",
        "tenantId": "tenant-1",
        "user": {"name": "dev@example.com", "type": "user"}
    }"#;

    #[tokio::test]
    async fn test_account_show() {
        let executor = FixedExecutor::new(vec![ExecutionResult::success(ACCOUNT)]);
        let az = AzCli::with_executor(executor.clone());

        let account = az.account_show().await.unwrap();

        assert_eq!(account.id, "0000-sub");
        assert_eq!(account.tenant_id.as_deref(), Some("tenant-1"));
        assert_eq!(executor.calls.lock().unwrap()[0][0], "az");
    }

    #[tokio::test]
    async fn test_account_show_not_logged_in() {
        let executor = FixedExecutor::new(vec![ExecutionResult::failure(
            Some(1),
            "Please run 'az login' to setup account.",
        )]);
        let az = AzCli::with_executor(executor);

        let err = az.account_show().await.unwrap_err();
        assert!(matches!(err, AzureError::NotLoggedIn(_)));
    }

    #[tokio::test]
    async fn test_current_principal_for_user() {
        let executor = FixedExecutor::new(vec![ExecutionResult::success("user-object-id")]);
        let az = AzCli::with_executor(executor.clone());
        let account: AccountInfo = serde_json::from_str(ACCOUNT).unwrap();

        let principal = az.current_principal(&account).await.unwrap();

        assert_eq!(principal, Principal::new("user-object-id", PrincipalKind::User));
        assert!(executor.calls.lock().unwrap()[0].contains(&"signed-in-user".to_string()));
    }

    #[tokio::test]
    async fn test_current_principal_for_service_principal() {
        let executor = FixedExecutor::new(vec![ExecutionResult::success("sp-object-id")]);
        let az = AzCli::with_executor(executor.clone());
        let account: AccountInfo = serde_json::from_str(
            r#"{"id": "s", "name": "n", "user": {"name": "app-id", "type": "servicePrincipal"}}"#,
        )
        .unwrap();

        let principal = az.current_principal(&account).await.unwrap();

        assert_eq!(principal.kind, PrincipalKind::ServicePrincipal);
        let calls = executor.calls.lock().unwrap();
        assert!(calls[0].contains(&"app-id".to_string()));
    }

    #[tokio::test]
    async fn test_missing_az_binary() {
        let executor = FixedExecutor::new(vec![ExecutionResult::failure(
            None,
            "failed to start az: No such file or directory",
        )]);
        let az = AzCli::with_executor(executor);
        assert!(matches!(
            az.check_installed().await,
            Err(AzureError::AzNotFound)
        ));
    }
}
