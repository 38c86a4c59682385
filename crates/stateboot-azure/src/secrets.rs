//! Repository secret publishing via the GitHub CLI
//!
//! Publishing is best-effort: every secret is attempted and a failure is
//! reported per key without affecting the others.

use crate::pipeline::steps;
use async_trait::async_trait;
use stateboot_core::{BackendConfig, CommandExecutor, OutputBundle, ProcessExecutor};
use std::sync::Arc;

/// Result of publishing one secret
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretOutcome {
    pub name: String,
    pub error: Option<String>,
}

impl SecretOutcome {
    pub fn is_published(&self) -> bool {
        self.error.is_none()
    }
}

/// Destination for named secret values
#[async_trait]
pub trait SecretSink: Send + Sync {
    async fn publish(&self, secrets: &[(String, String)]) -> Vec<SecretOutcome>;
}

/// Publishes secrets with `gh secret set`
///
/// Values are piped to `gh` on stdin and never appear in its argv.
pub struct GhSecretPublisher {
    executor: Arc<dyn CommandExecutor>,
    repo: Option<String>,
}

impl GhSecretPublisher {
    pub fn new(repo: Option<String>) -> Self {
        Self::with_executor(Arc::new(ProcessExecutor::new()), repo)
    }

    pub fn with_executor(executor: Arc<dyn CommandExecutor>, repo: Option<String>) -> Self {
        Self { executor, repo }
    }

    fn command(&self, name: &str) -> Vec<String> {
        let mut argv: Vec<String> = ["gh", "secret", "set", name]
            .into_iter()
            .map(String::from)
            .collect();
        if let Some(repo) = &self.repo {
            argv.push("--repo".to_string());
            argv.push(repo.clone());
        }
        argv
    }
}

#[async_trait]
impl SecretSink for GhSecretPublisher {
    async fn publish(&self, secrets: &[(String, String)]) -> Vec<SecretOutcome> {
        let mut outcomes = Vec::with_capacity(secrets.len());
        for (name, value) in secrets {
            let result = self
                .executor
                .execute_with_input(&self.command(name), value)
                .await;
            let error = if result.is_success() {
                tracing::info!("Published secret {}", name);
                None
            } else {
                let text = result.error_text();
                tracing::warn!("Could not publish secret {}: {}", name, text);
                Some(text)
            };
            outcomes.push(SecretOutcome {
                name: name.clone(),
                error,
            });
        }
        outcomes
    }
}

/// Secrets a CI pipeline needs to reach the state backend
pub fn backend_secrets(
    subscription_id: &str,
    backend: &BackendConfig,
    outputs: &OutputBundle,
) -> Vec<(String, String)> {
    let mut secrets = vec![
        ("AZURE_SUBSCRIPTION_ID".to_string(), subscription_id.to_string()),
        (
            "TF_STATE_RESOURCE_GROUP".to_string(),
            backend.resource_group_name.clone(),
        ),
        (
            "TF_STATE_STORAGE_ACCOUNT".to_string(),
            backend.storage_account_name.clone(),
        ),
        ("TF_STATE_CONTAINER".to_string(), backend.container_name.clone()),
    ];
    if let Some(client_id) = outputs.get(steps::IDENTITY, "client_id") {
        secrets.push(("AZURE_CLIENT_ID".to_string(), client_id.to_string()));
    }
    secrets
}

#[cfg(test)]
mod tests {
    use super::*;
    use stateboot_core::ExecutionResult;
    use std::sync::Mutex;

    struct RecordingGh {
        calls: Mutex<Vec<Vec<String>>>,
        inputs: Mutex<Vec<String>>,
        reject: &'static str,
    }

    impl RecordingGh {
        fn rejecting(reject: &'static str) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                inputs: Mutex::new(Vec::new()),
                reject,
            }
        }
    }

    #[async_trait]
    impl CommandExecutor for RecordingGh {
        async fn execute(&self, _argv: &[String]) -> ExecutionResult {
            panic!("secret values must be passed on stdin");
        }

        async fn execute_with_input(&self, argv: &[String], input: &str) -> ExecutionResult {
            self.calls.lock().unwrap().push(argv.to_vec());
            self.inputs.lock().unwrap().push(input.to_string());
            if argv[3] == self.reject {
                ExecutionResult::failure(Some(1), "HTTP 403: Resource not accessible")
            } else {
                ExecutionResult::success("")
            }
        }
    }

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_remaining_secrets() {
        let gh = Arc::new(RecordingGh::rejecting("B"));
        let publisher = GhSecretPublisher::with_executor(gh.clone(), Some("org/infra".into()));

        let outcomes = publisher
            .publish(&pairs(&[("A", "1"), ("B", "2"), ("C", "3")]))
            .await;

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].is_published());
        assert!(outcomes[1].error.as_deref().unwrap().contains("403"));
        assert!(outcomes[2].is_published());

        let calls = gh.calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[2], vec!["gh", "secret", "set", "C", "--repo", "org/infra"]);
        assert_eq!(*gh.inputs.lock().unwrap(), vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn test_values_never_on_command_line() {
        let gh = Arc::new(RecordingGh::rejecting(""));
        let publisher = GhSecretPublisher::with_executor(gh.clone(), None);

        publisher
            .publish(&pairs(&[("AZURE_CLIENT_ID", "00000000-aaaa-bbbb")]))
            .await;

        let calls = gh.calls.lock().unwrap();
        assert!(calls[0].iter().all(|arg| !arg.contains("00000000-aaaa-bbbb")));
        assert_eq!(gh.inputs.lock().unwrap()[0], "00000000-aaaa-bbbb");
    }

    #[tokio::test]
    async fn test_without_repo_uses_current_directory() {
        let gh = Arc::new(RecordingGh::rejecting(""));
        let publisher = GhSecretPublisher::with_executor(gh.clone(), None);

        publisher.publish(&pairs(&[("A", "1")])).await;

        assert!(!gh.calls.lock().unwrap()[0].contains(&"--repo".to_string()));
    }

    #[test]
    fn test_backend_secrets() {
        let backend = BackendConfig {
            resource_group_name: "rg".into(),
            storage_account_name: "tfstate12345".into(),
            container_name: "tfstate".into(),
            subscription_id: None,
            use_azuread_auth: true,
        };

        let secrets = backend_secrets("sub", &backend, &OutputBundle::default());

        let names: Vec<&str> = secrets.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "AZURE_SUBSCRIPTION_ID",
                "TF_STATE_RESOURCE_GROUP",
                "TF_STATE_STORAGE_ACCOUNT",
                "TF_STATE_CONTAINER"
            ]
        );
    }
}
