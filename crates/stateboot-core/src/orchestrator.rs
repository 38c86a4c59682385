//! Plan execution
//!
//! The orchestrator walks a [`Plan`] in dependency order. Each step runs in
//! its own task through the state machine
//!
//! ```text
//! Pending -> Running -> Succeeded
//!               |  ^
//!               v  |
//!            RetryWait
//!               |
//!               v
//!             Failed
//! ```
//!
//! Independent steps run concurrently up to the parallelism limit. The first
//! `Failed` step stops scheduling; steps already in flight finish their
//! current invocation but do not retry.

use crate::backoff::RetryPolicy;
use crate::classify::{Classification, ErrorClassifier};
use crate::error::{BootstrapError, Result};
use crate::event::{NoopObserver, Observer, StepEvent};
use crate::executor::CommandExecutor;
use crate::plan::Plan;
use crate::step::{ResolvedStep, Step, StepOutputs, StepState};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

const DEFAULT_PARALLELISM: usize = 2;

/// Outcome of one step within a run
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub id: String,
    pub state: StepState,
    /// Number of executor invocations for the main operation
    pub attempts: u32,
    /// Waits taken before each retry
    pub waits: Vec<Duration>,
    /// Every state the step passed through
    pub history: Vec<StepState>,
    pub outputs: StepOutputs,
    /// Error text that was classified as ignorable
    pub ignored_error: Option<String>,
    pub error: Option<String>,
    /// Stopped by cancellation rather than by its own failure
    pub cancelled: bool,
    pub elapsed: Duration,
}

impl StepRecord {
    fn pending(id: &str) -> Self {
        Self {
            id: id.to_string(),
            state: StepState::Pending,
            attempts: 0,
            waits: Vec::new(),
            history: vec![StepState::Pending],
            outputs: StepOutputs::new(),
            ignored_error: None,
            error: None,
            cancelled: false,
            elapsed: Duration::ZERO,
        }
    }

    fn transition(&mut self, state: StepState) {
        self.state = state;
        self.history.push(state);
    }

    /// Number of retries, i.e. attempts beyond the first
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

/// Resolved outputs of every succeeded step
#[derive(Debug, Clone, Default, Serialize)]
pub struct OutputBundle {
    pub steps: BTreeMap<String, StepOutputs>,
}

impl OutputBundle {
    pub fn get(&self, step: &str, field: &str) -> Option<&str> {
        self.steps
            .get(step)
            .and_then(|o| o.get(field))
            .map(String::as_str)
    }
}

/// Result of running a plan
#[derive(Debug)]
pub struct RunReport {
    /// One record per step, in plan order
    pub records: Vec<StepRecord>,
    /// Why the run stopped early, if it did
    pub failure: Option<BootstrapError>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    pub fn record(&self, id: &str) -> Option<&StepRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn state(&self, id: &str) -> Option<StepState> {
        self.record(id).map(|r| r.state)
    }

    pub fn total_retries(&self) -> u32 {
        self.records.iter().map(StepRecord::retries).sum()
    }

    pub fn outputs(&self) -> OutputBundle {
        OutputBundle {
            steps: self
                .records
                .iter()
                .filter(|r| r.state == StepState::Succeeded)
                .map(|r| (r.id.clone(), r.outputs.clone()))
                .collect(),
        }
    }

    /// Outputs of a fully successful run, or the error that stopped it
    pub fn into_result(self) -> Result<OutputBundle> {
        let outputs = self.outputs();
        match self.failure {
            Some(e) => Err(e),
            None => Ok(outputs),
        }
    }
}

/// Executes plans against a [`CommandExecutor`]
pub struct Orchestrator {
    executor: Arc<dyn CommandExecutor>,
    classifier: Arc<ErrorClassifier>,
    default_policy: RetryPolicy,
    parallelism: usize,
    observer: Arc<dyn Observer>,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            executor,
            classifier: Arc::new(ErrorClassifier::builtin()),
            default_policy: RetryPolicy::default(),
            parallelism: DEFAULT_PARALLELISM,
            observer: Arc::new(NoopObserver),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    /// Policy for steps that do not carry their own
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.default_policy = policy;
        self
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    /// Token that aborts the run when cancelled
    ///
    /// No new step is started after cancellation; in-flight invocations are
    /// allowed to finish.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run every step of `plan`
    pub async fn run(&self, plan: &Plan) -> RunReport {
        let started = Instant::now();
        let run_token = self.cancel.child_token();

        let mut records: HashMap<String, StepRecord> = plan
            .ordered()
            .map(|s| (s.id.clone(), StepRecord::pending(&s.id)))
            .collect();
        let mut outputs: HashMap<String, StepOutputs> = HashMap::new();
        let mut failure: Option<BootstrapError> = None;
        let mut tasks: JoinSet<StepRecord> = JoinSet::new();

        tracing::debug!(
            steps = plan.len(),
            parallelism = self.parallelism,
            "Starting plan execution"
        );

        loop {
            if failure.is_none() && !run_token.is_cancelled() {
                if let Err(e) = self.schedule_ready(
                    plan,
                    &mut records,
                    &outputs,
                    &mut tasks,
                    &run_token,
                ) {
                    failure = Some(e);
                    run_token.cancel();
                }
            }

            let Some(joined) = tasks.join_next().await else {
                break;
            };

            match joined {
                Ok(record) => {
                    if record.state == StepState::Succeeded {
                        outputs.insert(record.id.clone(), record.outputs.clone());
                    } else if failure.is_none() {
                        if record.cancelled {
                            failure = Some(BootstrapError::Cancelled);
                        } else {
                            failure = Some(BootstrapError::StepFailed {
                                step: record.id.clone(),
                                attempts: record.attempts,
                                error: record.error.clone().unwrap_or_default(),
                            });
                        }
                        run_token.cancel();
                    }
                    records.insert(record.id.clone(), record);
                }
                Err(e) => {
                    tracing::error!("Step task ended abnormally: {}", e);
                    if failure.is_none() {
                        failure = Some(BootstrapError::Join(e.to_string()));
                    }
                    run_token.cancel();
                }
            }
        }

        // Every task has been joined; a record still marked running belongs to
        // a task that died without reporting back.
        for record in records.values_mut() {
            if record.state == StepState::Running {
                record.transition(StepState::Failed);
                record.error = Some("step task ended without a result".to_string());
            }
        }

        if failure.is_none()
            && records
                .values()
                .any(|r| r.state != StepState::Succeeded)
        {
            failure = Some(BootstrapError::Cancelled);
        }

        let records = plan
            .ordered()
            .filter_map(|s| records.remove(&s.id))
            .collect();

        RunReport {
            records,
            failure,
            elapsed: started.elapsed(),
        }
    }

    /// Start every pending step whose dependencies have all succeeded
    fn schedule_ready(
        &self,
        plan: &Plan,
        records: &mut HashMap<String, StepRecord>,
        outputs: &HashMap<String, StepOutputs>,
        tasks: &mut JoinSet<StepRecord>,
        run_token: &CancellationToken,
    ) -> Result<()> {
        for step in plan.ordered() {
            if tasks.len() >= self.parallelism {
                break;
            }
            let ready = records
                .get(&step.id)
                .is_some_and(|r| r.state == StepState::Pending)
                && step.dependencies().iter().all(|dep| {
                    records
                        .get(dep)
                        .is_some_and(|r| r.state == StepState::Succeeded)
                });
            if !ready {
                continue;
            }

            let resolved = step.resolve(outputs)?;
            if let Some(record) = records.get_mut(&step.id) {
                record.transition(StepState::Running);
            }

            let task = StepTask {
                step: step.clone(),
                resolved,
                executor: Arc::clone(&self.executor),
                classifier: Arc::clone(&self.classifier),
                policy: step.retry_policy.unwrap_or(self.default_policy),
                observer: Arc::clone(&self.observer),
                cancel: run_token.clone(),
            };
            tasks.spawn(task.run());
        }
        Ok(())
    }
}

/// Everything one step needs to run to a terminal state
struct StepTask {
    step: Step,
    resolved: ResolvedStep,
    executor: Arc<dyn CommandExecutor>,
    classifier: Arc<ErrorClassifier>,
    policy: RetryPolicy,
    observer: Arc<dyn Observer>,
    cancel: CancellationToken,
}

impl StepTask {
    async fn run(self) -> StepRecord {
        let started = Instant::now();
        let mut record = StepRecord::pending(&self.step.id);

        loop {
            record.attempts += 1;
            record.transition(StepState::Running);
            self.observer.notify(&StepEvent::Started {
                step: self.step.id.clone(),
                description: self.step.description.clone(),
                attempt: record.attempts,
                max_attempts: self.policy.max_attempts,
            });

            let result = self.executor.execute(&self.resolved.argv).await;
            if result.is_success() {
                return match self.step.output_shape.parse(&result.stdout) {
                    Ok(outputs) => self.succeed(record, outputs, started),
                    Err(reason) => {
                        self.fail(record, format!("unexpected output: {}", reason), started)
                    }
                };
            }

            let error = result.error_text();
            match self.classifier.classify(&error, self.step.idempotent) {
                Classification::Ignorable => return self.ignore(record, error, started).await,
                Classification::Retryable => {
                    let Some(delay) = self.policy.delay_after(record.attempts) else {
                        return self.fail(record, error, started);
                    };
                    let attempt = record.attempts;
                    if !self.wait_for_retry(&mut record, attempt, delay, &error).await {
                        record.cancelled = true;
                        return self.fail(record, error, started);
                    }
                }
                Classification::Fatal => return self.fail(record, error, started),
            }
        }
    }

    /// The effect already holds; recover outputs through the follow-up read
    /// when the step has one
    ///
    /// The read is a new external call, so it is skipped once the run is
    /// cancelled. A failed read goes through the classifier and is retried
    /// under the step's policy like the main operation.
    async fn ignore(&self, mut record: StepRecord, error: String, started: Instant) -> StepRecord {
        self.observer.notify(&StepEvent::Ignored {
            step: self.step.id.clone(),
            error: error.clone(),
        });
        record.ignored_error = Some(error.clone());

        let Some(follow_up) = &self.resolved.follow_up else {
            return self.succeed(record, StepOutputs::new(), started);
        };

        let mut reads = 0;
        loop {
            if self.cancel.is_cancelled() {
                record.cancelled = true;
                return self.fail(record, error, started);
            }

            reads += 1;
            let result = self.executor.execute(follow_up).await;
            if result.is_success() {
                return match self.step.output_shape.parse(&result.stdout) {
                    Ok(outputs) => self.succeed(record, outputs, started),
                    Err(reason) => {
                        self.fail(record, format!("unexpected output: {}", reason), started)
                    }
                };
            }

            let read_error = result.error_text();
            if self.classifier.classify(&read_error, self.step.idempotent)
                != Classification::Retryable
            {
                return self.fail(record, read_error, started);
            }
            let Some(delay) = self.policy.delay_after(reads) else {
                return self.fail(record, read_error, started);
            };
            if !self.wait_for_retry(&mut record, reads, delay, &read_error).await {
                record.cancelled = true;
                return self.fail(record, read_error, started);
            }
            record.transition(StepState::Running);
        }
    }

    /// Sleep in `RetryWait` before the next attempt
    ///
    /// Returns false when the run is cancelled before or during the wait.
    async fn wait_for_retry(
        &self,
        record: &mut StepRecord,
        attempt: u32,
        delay: Duration,
        error: &str,
    ) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }

        record.transition(StepState::RetryWait);
        record.waits.push(delay);
        self.observer.notify(&StepEvent::RetryScheduled {
            step: self.step.id.clone(),
            attempt,
            max_attempts: self.policy.max_attempts,
            delay,
            error: error.to_string(),
        });

        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = self.cancel.cancelled() => false,
        }
    }

    fn succeed(&self, mut record: StepRecord, outputs: StepOutputs, started: Instant) -> StepRecord {
        record.transition(StepState::Succeeded);
        record.outputs = outputs;
        record.elapsed = started.elapsed();
        self.observer.notify(&StepEvent::Succeeded {
            step: self.step.id.clone(),
            attempts: record.attempts,
            elapsed: record.elapsed,
        });
        record
    }

    fn fail(&self, mut record: StepRecord, error: String, started: Instant) -> StepRecord {
        record.transition(StepState::Failed);
        record.elapsed = started.elapsed();
        self.observer.notify(&StepEvent::Failed {
            step: self.step.id.clone(),
            attempts: record.attempts,
            error: error.clone(),
            elapsed: record.elapsed,
        });
        record.error = Some(error);
        record
    }
}
