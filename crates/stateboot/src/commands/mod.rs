pub mod bootstrap;
pub mod plan;
pub mod scaffold;

use crate::options;
use colored::Colorize;
use rand::Rng;
use stateboot_azure::{BootstrapParams, EncryptionParams, Principal, key_vault_name};
use stateboot_config::Settings;
use stateboot_core::Plan;

/// Assemble pipeline parameters from settings and resolved names
///
/// The key vault name is generated from its prefix unless given.
pub fn bootstrap_params(
    settings: &Settings,
    storage_account: String,
    key_vault: Option<String>,
    principal: Principal,
    rng: &mut impl Rng,
) -> anyhow::Result<BootstrapParams> {
    let encryption = if settings.encryption.enabled {
        let key_vault = match key_vault {
            Some(name) => name,
            None => key_vault_name(&settings.encryption.key_vault_prefix, rng)?,
        };
        Some(EncryptionParams {
            key_vault,
            key_name: settings.encryption.key_name.clone(),
            identity: settings.encryption.identity.clone(),
        })
    } else {
        None
    };

    Ok(BootstrapParams {
        location: settings.location.clone(),
        resource_group: settings.resource_group.clone(),
        storage_account,
        container: settings.container.clone(),
        principal,
        encryption,
        roles: options::role_names(settings),
    })
}

/// Print the steps of a plan in execution order
pub fn print_plan(plan: &Plan, with_commands: bool) {
    println!();
    println!("{} ({} steps)", "Provisioning plan".bold(), plan.len());
    for (i, step) in plan.ordered().enumerate() {
        let deps = step.dependencies();
        let after = if deps.is_empty() {
            String::new()
        } else {
            format!(
                " after {}",
                deps.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
            )
        };
        println!(
            "{:>3}. {} {}{}",
            i + 1,
            step.description,
            format!("[{}]", step.id).cyan(),
            after.dimmed()
        );
        if with_commands {
            println!("       {}", step.display_command().dimmed());
        }
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use stateboot_azure::PrincipalKind;

    fn principal() -> Principal {
        Principal::new("oid", PrincipalKind::User)
    }

    #[test]
    fn test_params_generate_key_vault_name() {
        let mut rng = StdRng::seed_from_u64(3);
        let params = bootstrap_params(
            &Settings::default(),
            "tfstate12345".into(),
            None,
            principal(),
            &mut rng,
        )
        .unwrap();

        let encryption = params.encryption.unwrap();
        assert!(encryption.key_vault.starts_with("kv-tfstate-"));
        assert_eq!(encryption.key_name, "tfstate-cmk");
        assert_eq!(params.roles.blob_data, "Storage Blob Data Owner");
    }

    #[test]
    fn test_params_without_encryption() {
        let mut settings = Settings::default();
        settings.encryption.enabled = false;
        let mut rng = StdRng::seed_from_u64(3);

        let params = bootstrap_params(
            &settings,
            "tfstate12345".into(),
            Some("ignored".into()),
            principal(),
            &mut rng,
        )
        .unwrap();

        assert!(params.encryption.is_none());
    }
}
