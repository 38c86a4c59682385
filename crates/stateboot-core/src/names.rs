//! Resource name validation
//!
//! Names are checked before any external call so that a bad name surfaces as
//! a validation error instead of a provider failure halfway through a run.

use crate::error::{BootstrapError, Result};

/// Kind of resource a name is meant for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    ResourceGroup,
    StorageAccount,
    KeyVault,
    Key,
    ManagedIdentity,
    Container,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::ResourceGroup => write!(f, "resource group"),
            ResourceKind::StorageAccount => write!(f, "storage account"),
            ResourceKind::KeyVault => write!(f, "key vault"),
            ResourceKind::Key => write!(f, "key"),
            ResourceKind::ManagedIdentity => write!(f, "managed identity"),
            ResourceKind::Container => write!(f, "container"),
        }
    }
}

impl ResourceKind {
    /// Allowed length range (inclusive)
    pub fn length_range(&self) -> (usize, usize) {
        match self {
            ResourceKind::ResourceGroup => (1, 90),
            ResourceKind::StorageAccount => (3, 24),
            ResourceKind::KeyVault => (3, 24),
            ResourceKind::Key => (1, 127),
            ResourceKind::ManagedIdentity => (3, 128),
            ResourceKind::Container => (3, 63),
        }
    }
}

/// Check `name` against the naming rules of `kind`
pub fn validate(kind: ResourceKind, name: &str) -> Result<()> {
    check(kind, name).map_err(|reason| BootstrapError::Validation {
        kind: kind.to_string(),
        name: name.to_string(),
        reason,
    })
}

fn check(kind: ResourceKind, name: &str) -> std::result::Result<(), String> {
    let (min, max) = kind.length_range();
    let len = name.chars().count();
    if len < min || len > max {
        return Err(format!("must be {}-{} characters long", min, max));
    }

    match kind {
        ResourceKind::StorageAccount => {
            if !name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
            {
                return Err("only lowercase letters and digits are allowed".into());
            }
        }
        ResourceKind::KeyVault => {
            if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
                return Err("only letters, digits and hyphens are allowed".into());
            }
            if !name.starts_with(|c: char| c.is_ascii_alphabetic()) {
                return Err("must start with a letter".into());
            }
            if name.ends_with('-') || name.contains("--") {
                return Err("must not end with a hyphen or contain consecutive hyphens".into());
            }
        }
        ResourceKind::Key => {
            if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
                return Err("only letters, digits and hyphens are allowed".into());
            }
        }
        ResourceKind::ResourceGroup => {
            if !name
                .chars()
                .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '(' | ')'))
            {
                return Err("only letters, digits, '-', '_', '.', '(' and ')' are allowed".into());
            }
            if name.ends_with('.') {
                return Err("must not end with a period".into());
            }
        }
        ResourceKind::ManagedIdentity => {
            if !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            {
                return Err("only letters, digits, hyphens and underscores are allowed".into());
            }
            if !name.starts_with(|c: char| c.is_ascii_alphanumeric()) {
                return Err("must start with a letter or digit".into());
            }
        }
        ResourceKind::Container => {
            if !name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
            {
                return Err("only lowercase letters, digits and hyphens are allowed".into());
            }
            if name.starts_with('-') || name.ends_with('-') || name.contains("--") {
                return Err(
                    "must not start or end with a hyphen or contain consecutive hyphens".into(),
                );
            }
        }
    }
    Ok(())
}
