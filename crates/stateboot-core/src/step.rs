//! Provisioning steps
//!
//! A step is a command template (the argv of one external CLI call) with
//! `{{ name }}` placeholders. Placeholders are filled from literal inputs or
//! from outputs of earlier steps.

use crate::backoff::RetryPolicy;
use crate::error::{BootstrapError, Result};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::OnceLock;

/// Outputs recorded for a succeeded step
pub type StepOutputs = BTreeMap<String, String>;

/// Lifecycle state of a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Pending,
    Running,
    RetryWait,
    Succeeded,
    Failed,
}

impl std::fmt::Display for StepState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepState::Pending => write!(f, "pending"),
            StepState::Running => write!(f, "running"),
            StepState::RetryWait => write!(f, "retry-wait"),
            StepState::Succeeded => write!(f, "succeeded"),
            StepState::Failed => write!(f, "failed"),
        }
    }
}

/// Value bound to a placeholder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputValue {
    Literal(String),
    /// Output `field` of step `step`
    Output { step: String, field: String },
}

/// Shape of the text a step expects back on success
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputShape {
    /// Output is ignored
    #[default]
    None,
    /// A single trimmed value stored under the given name
    Scalar(String),
    /// A JSON object; each entry maps an output name to a dotted path
    Fields(Vec<(String, String)>),
}

impl OutputShape {
    /// Parse stdout of a successful invocation
    pub fn parse(&self, stdout: &str) -> std::result::Result<StepOutputs, String> {
        let mut outputs = StepOutputs::new();
        match self {
            OutputShape::None => {}
            OutputShape::Scalar(name) => {
                let value = stdout.trim();
                if value.is_empty() {
                    return Err(format!("expected a value for '{}', got empty output", name));
                }
                if value.lines().count() > 1 {
                    return Err(format!(
                        "expected a single value for '{}', got {} lines",
                        name,
                        value.lines().count()
                    ));
                }
                outputs.insert(name.clone(), value.to_string());
            }
            OutputShape::Fields(fields) => {
                let json: serde_json::Value = serde_json::from_str(stdout.trim())
                    .map_err(|e| format!("expected JSON output: {}", e))?;
                for (name, path) in fields {
                    let value = lookup(&json, path)
                        .ok_or_else(|| format!("field '{}' missing from output", path))?;
                    outputs.insert(name.clone(), value);
                }
            }
        }
        Ok(outputs)
    }
}

fn lookup(json: &serde_json::Value, path: &str) -> Option<String> {
    let value = path
        .split('.')
        .try_fold(json, |value, key| value.get(key))?;
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").expect("placeholder pattern is valid")
    })
}

/// A unit of provisioning work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Unique within a plan
    pub id: String,

    /// Human readable summary
    pub description: String,

    /// Command template, argv[0] is the program
    pub operation: Vec<String>,

    pub inputs: BTreeMap<String, InputValue>,

    /// Explicit dependencies; steps referenced by inputs are added implicitly
    pub depends_on: BTreeSet<String>,

    /// Overrides the orchestrator's default policy
    pub retry_policy: Option<RetryPolicy>,

    /// "Already exists" counts as success
    pub idempotent: bool,

    pub output_shape: OutputShape,

    /// Read operation run after an ignorable failure to recover outputs
    pub follow_up: Option<Vec<String>>,
}

impl Step {
    pub fn new<I, S>(id: impl Into<String>, operation: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = id.into();
        Self {
            description: id.clone(),
            id,
            operation: operation.into_iter().map(Into::into).collect(),
            inputs: BTreeMap::new(),
            depends_on: BTreeSet::new(),
            retry_policy: None,
            idempotent: false,
            output_shape: OutputShape::None,
            follow_up: None,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn literal(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.inputs
            .insert(name.into(), InputValue::Literal(value.into()));
        self
    }

    pub fn output_of(
        mut self,
        name: impl Into<String>,
        step: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        self.inputs.insert(
            name.into(),
            InputValue::Output {
                step: step.into(),
                field: field.into(),
            },
        );
        self
    }

    pub fn after(mut self, step: impl Into<String>) -> Self {
        self.depends_on.insert(step.into());
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    pub fn idempotent(mut self) -> Self {
        self.idempotent = true;
        self
    }

    pub fn expect_scalar(mut self, name: impl Into<String>) -> Self {
        self.output_shape = OutputShape::Scalar(name.into());
        self
    }

    pub fn expect_field(mut self, name: impl Into<String>, path: impl Into<String>) -> Self {
        let entry = (name.into(), path.into());
        match &mut self.output_shape {
            OutputShape::Fields(fields) => fields.push(entry),
            shape => *shape = OutputShape::Fields(vec![entry]),
        }
        self
    }

    pub fn follow_up<I, S>(mut self, operation: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.follow_up = Some(operation.into_iter().map(Into::into).collect());
        self
    }

    /// All steps that must succeed before this one runs
    pub fn dependencies(&self) -> BTreeSet<String> {
        let mut deps = self.depends_on.clone();
        for input in self.inputs.values() {
            if let InputValue::Output { step, .. } = input {
                deps.insert(step.clone());
            }
        }
        deps
    }

    /// Substitute every placeholder of `template`
    fn render(
        &self,
        template: &[String],
        outputs: &HashMap<String, StepOutputs>,
    ) -> Result<Vec<String>> {
        let mut failure = None;
        let rendered = template
            .iter()
            .map(|token| {
                placeholder_pattern()
                    .replace_all(token, |caps: &Captures| {
                        match self.input_value(&caps[1], outputs) {
                            Ok(value) => value,
                            Err(e) => {
                                failure.get_or_insert(e);
                                String::new()
                            }
                        }
                    })
                    .into_owned()
            })
            .collect();
        match failure {
            Some(e) => Err(e),
            None => Ok(rendered),
        }
    }

    fn input_value(&self, name: &str, outputs: &HashMap<String, StepOutputs>) -> Result<String> {
        match self.inputs.get(name) {
            Some(InputValue::Literal(value)) => Ok(value.clone()),
            Some(InputValue::Output { step, field }) => outputs
                .get(step)
                .and_then(|o| o.get(field))
                .cloned()
                .ok_or_else(|| BootstrapError::MissingOutput {
                    step: self.id.clone(),
                    source_step: step.clone(),
                    field: field.clone(),
                }),
            None => Err(BootstrapError::UnresolvedPlaceholder {
                step: self.id.clone(),
                placeholder: name.to_string(),
            }),
        }
    }

    /// Resolve the operation against outputs of finished steps
    pub fn resolve(&self, outputs: &HashMap<String, StepOutputs>) -> Result<ResolvedStep> {
        Ok(ResolvedStep {
            argv: self.render(&self.operation, outputs)?,
            follow_up: self
                .follow_up
                .as_ref()
                .map(|op| self.render(op, outputs))
                .transpose()?,
        })
    }

    /// Placeholders used by the templates that have no input bound
    pub fn unbound_placeholders(&self) -> Vec<String> {
        self.operation
            .iter()
            .chain(self.follow_up.iter().flatten())
            .flat_map(|token| placeholder_pattern().captures_iter(token))
            .map(|caps| caps[1].to_string())
            .filter(|name| !self.inputs.contains_key(name))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// The command as it would be shown before outputs are known
    pub fn display_command(&self) -> String {
        self.operation
            .iter()
            .map(|token| {
                placeholder_pattern()
                    .replace_all(token, |caps: &Captures| match self.inputs.get(&caps[1]) {
                        Some(InputValue::Literal(value)) => value.clone(),
                        Some(InputValue::Output { step, field }) => format!("<{}.{}>", step, field),
                        None => caps[0].to_string(),
                    })
                    .into_owned()
            })
            .map(|token| shell_quote(&token))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A step with every placeholder substituted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedStep {
    pub argv: Vec<String>,
    pub follow_up: Option<Vec<String>>,
}

/// Quote a token for display when it contains whitespace or quotes
pub fn shell_quote(token: &str) -> String {
    if !token.is_empty()
        && !token
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '\'' | '"' | '$' | '`'))
    {
        return token.to_string();
    }
    format!("'{}'", token.replace('\'', "'\\''"))
}
