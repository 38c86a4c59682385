use crate::commands::{bootstrap_params, print_plan};
use crate::options::ResourceArgs;
use stateboot_azure::{Principal, PrincipalKind, build_plan, storage_account_name};
use stateboot_config::Settings;

/// Print the provisioning plan without touching Azure
pub fn handle(settings: Settings, resources: &ResourceArgs, principal_id: &str) -> anyhow::Result<()> {
    let settings = resources.apply(settings);
    let mut rng = rand::thread_rng();

    let storage_account = match &resources.storage_account {
        Some(name) => name.clone(),
        None => storage_account_name(&settings.storage_account_prefix, &mut rng)?,
    };
    let params = bootstrap_params(
        &settings,
        storage_account,
        resources.key_vault.clone(),
        Principal::new(principal_id, PrincipalKind::User),
        &mut rng,
    )?;

    let plan = build_plan(&params)?;
    print_plan(&plan, true);

    println!("backend.conf will be written for:");
    for env in &settings.environments {
        println!("  {}", settings.terraform_dir.join(env).join("backend.conf").display());
    }
    Ok(())
}
