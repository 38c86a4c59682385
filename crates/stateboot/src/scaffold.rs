//! Terraform project skeleton
//!
//! Creates placeholder files for a CI-driven Terraform project. Existing
//! files are never overwritten.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const TERRAFORM_FILES: [(&str, &str); 6] = [
    ("main.tf", "Terraform main configuration"),
    ("variables.tf", "Terraform variables"),
    ("network.tf", "Network resources"),
    ("logging.tf", "Logging & monitoring"),
    ("appservice.tf", "App Service resources"),
    ("terraform.tfvars", "Placeholders for variables"),
];

const GITIGNORE: &str = "\
# Terraform specific
.terraform/
*.tfstate
*.tfstate.backup
*.tfvars
.env

# Python specific
__pycache__/
*.py[cod]
venv/
*.conf
";

/// What happened to one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    Created,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaffoldEntry {
    /// Relative to the project root
    pub path: PathBuf,
    pub status: FileStatus,
}

fn files(terraform_dir: &Path, environments: &[String]) -> Vec<(PathBuf, String)> {
    let mut files = vec![
        (
            PathBuf::from(".github/workflows/ci-cd.yml"),
            "# Placeholder CI/CD workflow\n".to_string(),
        ),
        (
            PathBuf::from("app/app.py"),
            "# Placeholder app\nprint('Hello World from Azure App Service')\n".to_string(),
        ),
    ];
    for env in environments {
        let label = env.to_uppercase();
        for (name, title) in TERRAFORM_FILES {
            files.push((
                terraform_dir.join(env).join(name),
                format!("# {} for {}\n", title, label),
            ));
        }
    }
    files.push((PathBuf::from(".gitignore"), GITIGNORE.to_string()));
    files
}

/// Create the skeleton under `root`
pub fn scaffold(
    root: &Path,
    terraform_dir: &Path,
    environments: &[String],
) -> io::Result<Vec<ScaffoldEntry>> {
    let mut entries = Vec::new();
    for (relative, content) in files(terraform_dir, environments) {
        let path = root.join(&relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let status = if path.exists() {
            FileStatus::Skipped
        } else {
            fs::write(&path, content)?;
            FileStatus::Created
        };
        tracing::debug!("{}: {:?}", relative.display(), status);
        entries.push(ScaffoldEntry {
            path: relative,
            status,
        });
    }
    Ok(entries)
}
