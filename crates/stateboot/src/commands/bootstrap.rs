use crate::commands::{bootstrap_params, print_plan};
use crate::options::{self, ResourceArgs};
use crate::progress::ProgressReporter;
use crate::prompt::Prompter;
use anyhow::bail;
use colored::Colorize;
use stateboot_azure::{
    AccountInfo, AzCli, AzureError, GhSecretPublisher, Principal, PrincipalKind, SecretSink,
    backend_secrets, build_plan, storage_account_name,
};
use stateboot_config::Settings;
use stateboot_core::{ArtifactWriter, BackendConfig, BackendFileWriter, Orchestrator};
use std::io::{BufRead, Write};
use std::sync::Arc;

pub struct BootstrapOptions {
    pub resources: ResourceArgs,
    pub yes: bool,
    pub dry_run: bool,
    pub publish_secrets: bool,
    pub repo: Option<String>,
}

pub async fn handle(settings: Settings, opts: BootstrapOptions) -> anyhow::Result<()> {
    let mut settings = opts.resources.apply(settings);
    if opts.publish_secrets {
        settings.github.publish_secrets = true;
    }
    if opts.repo.is_some() {
        settings.github.repo = opts.repo.clone();
    }
    let mut prompter = Prompter::stdio(opts.yes);

    let az = AzCli::new();
    az.check_installed().await?;

    println!("{}", "Checking Azure login...".blue());
    let login = login(&az, &settings, &mut prompter).await?;
    let account = &login.account;
    println!(
        "{} {} ({})",
        "✓ Logged in to".green(),
        account.name.cyan(),
        account.id.dimmed()
    );

    let principal = match az.current_principal(account).await {
        Ok(principal) => principal,
        Err(e) => {
            tracing::warn!("Could not resolve the signed-in principal: {}", e);
            if !prompter.is_interactive() {
                bail!("Could not determine the principal for role assignments: {}", e);
            }
            let object_id = prompter.ask("Object id of the principal for role assignments", "")?;
            if object_id.is_empty() {
                bail!("A principal object id is required for role assignments");
            }
            Principal::new(object_id, PrincipalKind::User)
        }
    };

    settings.resource_group = prompter.ask("Resource group", &settings.resource_group)?;
    settings.location = prompter.ask("Location", &settings.location)?;
    settings.container = prompter.ask("Blob container", &settings.container)?;

    let params = {
        let mut rng = rand::thread_rng();
        let storage_account = match &opts.resources.storage_account {
            Some(name) => name.clone(),
            None => loop {
                let prefix = prompter.ask(
                    "Storage account prefix (3-19 lowercase letters or digits)",
                    &settings.storage_account_prefix,
                )?;
                match storage_account_name(&prefix, &mut rng) {
                    Ok(name) => break name,
                    Err(e) if prompter.is_interactive() => println!("{} {}", "✗".red(), e),
                    Err(e) => return Err(e.into()),
                }
            },
        };
        bootstrap_params(
            &settings,
            storage_account,
            opts.resources.key_vault.clone(),
            principal,
            &mut rng,
        )?
    };

    let plan = build_plan(&params)?;
    print_plan(&plan, opts.dry_run);

    if opts.dry_run {
        println!("{}", "Dry run: nothing was changed.".yellow());
        return Ok(());
    }

    if !prompter.confirm("Proceed with provisioning?", true)? {
        println!("{}", "Cancelled.".yellow());
        return Ok(());
    }

    let reporter = Arc::new(ProgressReporter::new());
    let orchestrator = Orchestrator::new(az.executor())
        .with_classifier(options::classifier(&settings))
        .with_retry_policy(options::retry_policy(&settings))
        .with_parallelism(settings.parallelism)
        .with_observer(reporter.clone());

    let token = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!(
                "{}",
                "Interrupted, waiting for running commands to finish...".yellow()
            );
            token.cancel();
        }
    });

    println!("{} {}", "Provisioning in".blue(), params.location.cyan());
    let report = orchestrator.run(&plan).await;
    reporter.print_summary(&params.storage_account, &report);
    let outputs = report.into_result()?;

    let backend = BackendConfig {
        resource_group_name: params.resource_group.clone(),
        storage_account_name: params.storage_account.clone(),
        container_name: params.container.clone(),
        subscription_id: login.backend_subscription(),
        use_azuread_auth: true,
    };

    let writer = BackendFileWriter::new(&settings.terraform_dir);
    let written = match writer.write(&backend, &settings.environments).await {
        Ok(paths) => paths,
        Err(e) => {
            eprintln!();
            eprintln!(
                "{}",
                "✗ Resources were provisioned, but writing backend files failed"
                    .red()
                    .bold()
            );
            eprintln!("  {}", e);
            eprintln!();
            eprintln!("Backend settings to use by hand:");
            eprintln!("{}", backend.render("<environment>"));
            return Err(e.into());
        }
    };

    println!();
    for path in &written {
        println!("{} {}", "✓ Wrote".green(), path.display().to_string().cyan());
    }

    if settings.github.publish_secrets {
        println!();
        println!("{}", "Publishing repository secrets...".blue());
        let publisher = GhSecretPublisher::new(settings.github.repo.clone());
        let outcomes = publisher
            .publish(&backend_secrets(&account.id, &backend, &outputs))
            .await;
        for outcome in &outcomes {
            match &outcome.error {
                None => println!("  {} {}", "✓".green(), outcome.name),
                Some(error) => println!(
                    "  {} {}: {}",
                    "⚠".yellow(),
                    outcome.name,
                    error.dimmed()
                ),
            }
        }
    }

    println!();
    println!("{}", "✓ Backend ready".green().bold());
    println!("{}", "Next:".bold());
    for env in &settings.environments {
        println!(
            "  terraform -chdir={} init -backend-config=backend.conf",
            settings.terraform_dir.join(env).display()
        );
    }

    Ok(())
}

struct Login {
    account: AccountInfo,
    /// A subscription was named by flag, settings file, or prompt
    explicit_subscription: bool,
}

impl Login {
    /// Subscription pinned in backend.conf
    fn backend_subscription(&self) -> Option<String> {
        self.explicit_subscription.then(|| self.account.id.clone())
    }
}

/// Current login, logging in and switching subscription as needed
async fn login<R: BufRead, W: Write>(
    az: &AzCli,
    settings: &Settings,
    prompter: &mut Prompter<R, W>,
) -> anyhow::Result<Login> {
    let mut account = match az.account_show().await {
        Ok(account) => account,
        Err(AzureError::NotLoggedIn(_)) => {
            println!("{}", "Not logged in, opening browser...".yellow());
            az.login().await?;
            az.account_show().await?
        }
        Err(e) => return Err(e.into()),
    };

    let subscription = match &settings.subscription {
        Some(subscription) => Some(subscription.clone()),
        None => {
            let keep =
                prompter.confirm(&format!("Use subscription '{}'?", account.name), true)?;
            if keep {
                None
            } else {
                Some(prompter.ask("Subscription ID", "")?)
            }
        }
    };

    let subscription = subscription.filter(|s| !s.is_empty());
    let explicit_subscription = subscription.is_some();
    if let Some(subscription) = subscription.filter(|s| *s != account.id) {
        az.set_subscription(&subscription).await?;
        account = az.account_show().await?;
    }
    Ok(Login {
        account,
        explicit_subscription,
    })
}
