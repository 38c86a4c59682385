//! Generated resource names
//!
//! Storage account and key vault names are globally unique, so they get a
//! random five-digit suffix.

use crate::error::{AzureError, Result};
use rand::Rng;
use stateboot_core::{BootstrapError, ResourceKind, validate_name};

const SUFFIX_MIN: u32 = 10_000;
const SUFFIX_MAX: u32 = 99_999;

/// `<prefix><5 digits>`
pub fn with_random_suffix(prefix: &str, rng: &mut impl Rng) -> String {
    format!("{}{}", prefix, rng.gen_range(SUFFIX_MIN..=SUFFIX_MAX))
}

/// Storage account name from a prefix, validated
pub fn storage_account_name(prefix: &str, rng: &mut impl Rng) -> Result<String> {
    generate(ResourceKind::StorageAccount, prefix, rng)
}

/// Key vault name from a prefix, validated
pub fn key_vault_name(prefix: &str, rng: &mut impl Rng) -> Result<String> {
    let prefix = if prefix.ends_with('-') {
        prefix.to_string()
    } else {
        format!("{}-", prefix)
    };
    generate(ResourceKind::KeyVault, &prefix, rng)
}

fn generate(kind: ResourceKind, prefix: &str, rng: &mut impl Rng) -> Result<String> {
    let name = with_random_suffix(prefix, rng);
    match validate_name(kind, &name) {
        Ok(()) => Ok(name),
        Err(BootstrapError::Validation { reason, .. }) => Err(AzureError::InvalidPrefix {
            kind: kind.to_string(),
            prefix: prefix.to_string(),
            reason,
        }),
        Err(e) => Err(e.into()),
    }
}
