mod commands;
mod options;
mod progress;
mod prompt;
mod scaffold;

use anyhow::Context;
use clap::{Parser, Subcommand};
use options::ResourceArgs;
use stateboot_config::Settings;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stateboot")]
#[command(about = "Bootstrap an Azure Terraform state backend", long_about = None)]
struct Cli {
    /// Settings file (default: discovered from the current directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log every CLI invocation
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision the state backend and write backend.conf files
    Bootstrap {
        #[command(flatten)]
        resources: ResourceArgs,
        /// Accept every default without asking
        #[arg(short, long)]
        yes: bool,
        /// Print the plan and exit
        #[arg(long)]
        dry_run: bool,
        /// Publish backend coordinates as GitHub repository secrets
        #[arg(long)]
        publish_secrets: bool,
        /// Repository for the secrets (owner/name)
        #[arg(long)]
        repo: Option<String>,
    },
    /// Show the provisioning steps without calling Azure
    Plan {
        #[command(flatten)]
        resources: ResourceArgs,
        /// Object id shown in role assignments
        #[arg(long, default_value = "<principal-id>")]
        principal_id: String,
    },
    /// Create the Terraform project skeleton
    Scaffold {
        /// Project root
        #[arg(default_value = ".")]
        dir: PathBuf,
        /// Environments to create folders for (comma separated)
        #[arg(short, long, value_delimiter = ',')]
        environments: Vec<String>,
        /// Directory that contains one folder per environment
        #[arg(long)]
        terraform_dir: Option<PathBuf>,
    },
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config = cli.config.as_deref();

    match cli.command {
        Commands::Version => {
            println!("stateboot {}", env!("CARGO_PKG_VERSION"));
        }
        Commands::Bootstrap {
            resources,
            yes,
            dry_run,
            publish_secrets,
            repo,
        } => {
            commands::bootstrap::handle(
                load_settings(config)?,
                commands::bootstrap::BootstrapOptions {
                    resources,
                    yes,
                    dry_run,
                    publish_secrets,
                    repo,
                },
            )
            .await?;
        }
        Commands::Plan {
            resources,
            principal_id,
        } => {
            commands::plan::handle(load_settings(config)?, &resources, &principal_id)?;
        }
        Commands::Scaffold {
            dir,
            environments,
            terraform_dir,
        } => {
            commands::scaffold::handle(load_settings(config)?, &dir, environments, terraform_dir)?;
        }
    }

    Ok(())
}

fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    if let Some(path) = path {
        return Settings::load_from(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()));
    }
    let (settings, path) = stateboot_config::load()?;
    match path {
        Some(path) => tracing::info!("Using settings from {}", path.display()),
        None => tracing::debug!("No settings file found, using defaults"),
    }
    Ok(settings)
}
