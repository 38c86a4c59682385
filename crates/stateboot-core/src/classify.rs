//! Error text classification
//!
//! The provider CLI reports failures as untyped text, so classification is a
//! single ordered rule table. The first matching rule wins; text that matches
//! no rule is `Fatal`.

use serde::{Deserialize, Serialize};

/// What the orchestrator should do with a failed invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Transient propagation delay; retry after backoff
    Retryable,
    /// The effect already holds; treat as success
    Ignorable,
    /// Abort the run
    Fatal,
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Classification::Retryable => write!(f, "retryable"),
            Classification::Ignorable => write!(f, "ignorable"),
            Classification::Fatal => write!(f, "fatal"),
        }
    }
}

/// One entry of the rule table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// Case-insensitive substring to look for
    pub pattern: String,

    pub classification: Classification,

    /// Only applies to steps that accept "already exists" as success
    pub idempotent_only: bool,
}

impl Rule {
    pub fn new(pattern: impl Into<String>, classification: Classification) -> Self {
        Self {
            pattern: pattern.into().to_lowercase(),
            classification,
            idempotent_only: false,
        }
    }

    pub fn idempotent_only(mut self) -> Self {
        self.idempotent_only = true;
        self
    }

    fn matches(&self, lowered: &str, idempotent: bool) -> bool {
        (idempotent || !self.idempotent_only) && lowered.contains(&self.pattern)
    }
}

const IGNORABLE: &[&str] = &[
    "RoleAssignmentExists",
    "role assignment already exists",
    "registration is in progress",
    "RegistrationInProgress",
];

const IGNORABLE_WHEN_IDEMPOTENT: &[&str] = &["ContainerAlreadyExists", "already exists"];

// Checked before the "already exists" and retryable rules: a name taken by
// another tenant is never ours.
const FATAL: &[&str] = &[
    "StorageAccountAlreadyTaken",
    "VaultAlreadyExists",
    "AccountNameInvalid",
    "InvalidAuthenticationToken",
    "QuotaExceeded",
    "SubscriptionNotFound",
];

const RETRYABLE: &[&str] = &[
    "ResourceNotFound",
    "ResourceGroupNotFound",
    "ParentResourceNotFound",
    "PrincipalNotFound",
    "does not exist in the directory",
    "AuthorizationFailed",
    "AuthorizationPermissionMismatch",
    "ForbiddenByRbac",
    "ConnectionAbortedError",
    "ConnectionResetError",
    "Connection aborted",
    "RequestDisallowedByPolicy",
];

/// Ordered rule table mapping error text to a [`Classification`]
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    rules: Vec<Rule>,
}

impl ErrorClassifier {
    /// Built-in rules for the Azure CLI error surface
    pub fn builtin() -> Self {
        let mut rules = Vec::new();
        rules.extend(
            IGNORABLE
                .iter()
                .map(|p| Rule::new(*p, Classification::Ignorable)),
        );
        rules.extend(FATAL.iter().map(|p| Rule::new(*p, Classification::Fatal)));
        rules.extend(
            IGNORABLE_WHEN_IDEMPOTENT
                .iter()
                .map(|p| Rule::new(*p, Classification::Ignorable).idempotent_only()),
        );
        rules.extend(
            RETRYABLE
                .iter()
                .map(|p| Rule::new(*p, Classification::Retryable)),
        );
        Self { rules }
    }

    /// An empty table: everything is `Fatal`
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Append a rule after the existing ones
    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Append extra retryable patterns after the existing rules
    pub fn with_retryable<I, S>(self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        patterns.into_iter().fold(self, |c, p| {
            c.with_rule(Rule::new(p, Classification::Retryable))
        })
    }

    /// Append extra ignorable patterns after the existing rules
    pub fn with_ignorable<I, S>(self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        patterns.into_iter().fold(self, |c, p| {
            c.with_rule(Rule::new(p, Classification::Ignorable))
        })
    }

    /// Classify raw error text for a step
    pub fn classify(&self, error_text: &str, idempotent: bool) -> Classification {
        let lowered = error_text.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.matches(&lowered, idempotent))
            .map(|rule| rule.classification)
            .unwrap_or(Classification::Fatal)
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::builtin()
    }
}
