use crate::scaffold::{FileStatus, scaffold};
use colored::Colorize;
use stateboot_config::Settings;
use std::path::{Path, PathBuf};

pub fn handle(
    settings: Settings,
    dir: &Path,
    environments: Vec<String>,
    terraform_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    let environments = if environments.is_empty() {
        settings.environments
    } else {
        environments
    };
    let terraform_dir = terraform_dir.unwrap_or(settings.terraform_dir);

    println!(
        "{} {}",
        "Scaffolding project in".blue(),
        dir.display().to_string().cyan()
    );

    let entries = scaffold(dir, &terraform_dir, &environments)?;
    for entry in &entries {
        match entry.status {
            FileStatus::Created => println!("{} {}", "✓ Created".green(), entry.path.display()),
            FileStatus::Skipped => println!(
                "{} {} {}",
                "⚠ Skipped".yellow(),
                entry.path.display(),
                "(already exists)".dimmed()
            ),
        }
    }

    println!();
    println!("{}", "✓ Project skeleton ready".green().bold());
    println!("  Next: {} bootstrap", "stateboot".cyan());
    Ok(())
}
