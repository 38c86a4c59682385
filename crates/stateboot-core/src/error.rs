//! Bootstrap error types

use thiserror::Error;

/// Errors surfaced by plan construction, orchestration, and artifact output
#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("Invalid {kind} name '{name}': {reason}")]
    Validation {
        kind: String,
        name: String,
        reason: String,
    },

    #[error("Duplicate step id: {0}")]
    DuplicateStep(String),

    #[error("Step '{step}' depends on unknown step '{dependency}'")]
    UnknownDependency { step: String, dependency: String },

    #[error("Dependency cycle between steps: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    #[error("Step '{step}' has no value for placeholder '{placeholder}'")]
    UnresolvedPlaceholder { step: String, placeholder: String },

    #[error("Step '{step}' needs output '{field}' of '{source_step}', which was not produced")]
    MissingOutput {
        step: String,
        source_step: String,
        field: String,
    },

    #[error("Step '{step}' failed after {attempts} attempt(s):\n{error}")]
    StepFailed {
        step: String,
        attempts: u32,
        error: String,
    },

    #[error("Run cancelled before all steps completed")]
    Cancelled,

    #[error("Failed to write artifact {path}: {source}")]
    Artifact {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Step task panicked: {0}")]
    Join(String),
}

pub type Result<T> = std::result::Result<T, BootstrapError>;
