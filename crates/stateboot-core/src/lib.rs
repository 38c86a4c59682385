//! stateboot core
//!
//! Provisioning engine for bootstrapping a Terraform state backend through an
//! external cloud CLI. A bootstrap run is a [`Plan`] of [`Step`]s executed by
//! the [`Orchestrator`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                 stateboot CLI                    │
//! │        (prompts, names, config, summary)         │
//! └─────────────────┬───────────────────────────────┘
//!                   │ Plan
//! ┌─────────────────▼───────────────────────────────┐
//! │                stateboot-core                    │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │              Orchestrator                 │   │
//! │  │  dependency order · retry · fail-fast     │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────┐            │
//! │  │  Classifier  │  │   Backoff    │            │
//! │  └──────────────┘  └──────────────┘            │
//! └───────┬─────────────────────────┬───────────────┘
//!         │ argv                    │ outputs
//! ┌───────▼───────┐         ┌───────▼───────┐
//! │ CommandExecutor│        │ ArtifactWriter │
//! │   (az, gh)     │        │ backend.conf   │
//! └───────────────┘         └───────────────┘
//! ```

pub mod artifact;
pub mod backoff;
pub mod classify;
pub mod error;
pub mod event;
pub mod executor;
pub mod names;
pub mod orchestrator;
pub mod plan;
pub mod step;

// Re-exports
pub use artifact::{ArtifactWriter, BackendConfig, BackendFileWriter};
pub use backoff::RetryPolicy;
pub use classify::{Classification, ErrorClassifier, Rule};
pub use error::{BootstrapError, Result};
pub use event::{NoopObserver, Observer, RecordingObserver, StepEvent, TracingObserver};
pub use executor::{CommandExecutor, ExecutionResult, ProcessExecutor};
pub use names::{ResourceKind, validate as validate_name};
pub use orchestrator::{OutputBundle, Orchestrator, RunReport, StepRecord};
pub use plan::Plan;
pub use step::{InputValue, OutputShape, ResolvedStep, Step, StepOutputs, StepState};
