pub mod error;
pub mod settings;

pub use error::*;
pub use settings::*;

use std::path::PathBuf;

const CONFIG_ENV: &str = "STATEBOOT_CONFIG";
const CANDIDATES: [&str; 2] = ["stateboot.local.yaml", "stateboot.yaml"];

/// Locate the settings file
///
/// Search order:
/// 1. `STATEBOOT_CONFIG` environment variable
/// 2. current directory: stateboot.local.yaml, stateboot.yaml
/// 3. `./.stateboot/`, same order
/// 4. `~/.config/stateboot/stateboot.yaml`
pub fn find_config_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(CONFIG_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
    }

    let current_dir = std::env::current_dir()?;

    for filename in &CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    let project_dir = current_dir.join(".stateboot");
    if project_dir.is_dir() {
        for filename in &CANDIDATES {
            let path = project_dir.join(filename);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("stateboot").join("stateboot.yaml");
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::ConfigFileNotFound)
}

/// Load settings from the discovered file, or defaults when there is none
///
/// Returns the path that was used alongside the settings.
pub fn load() -> Result<(Settings, Option<PathBuf>)> {
    match find_config_file() {
        Ok(path) => Ok((Settings::load_from(&path)?, Some(path))),
        Err(ConfigError::ConfigFileNotFound) => Ok((Settings::default(), None)),
        Err(e) => Err(e),
    }
}
