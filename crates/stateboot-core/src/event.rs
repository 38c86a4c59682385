//! Progress events emitted by the orchestrator

use std::sync::Mutex;
use std::time::Duration;

/// A state transition of one step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepEvent {
    Started {
        step: String,
        description: String,
        attempt: u32,
        max_attempts: u32,
    },
    RetryScheduled {
        step: String,
        attempt: u32,
        max_attempts: u32,
        delay: Duration,
        error: String,
    },
    Ignored {
        step: String,
        error: String,
    },
    Succeeded {
        step: String,
        attempts: u32,
        elapsed: Duration,
    },
    Failed {
        step: String,
        attempts: u32,
        error: String,
        elapsed: Duration,
    },
}

/// Receives step events as they happen
///
/// Called from step tasks, possibly concurrently.
pub trait Observer: Send + Sync {
    fn notify(&self, event: &StepEvent);
}

/// Discards every event
#[derive(Debug, Default)]
pub struct NoopObserver;

impl Observer for NoopObserver {
    fn notify(&self, _event: &StepEvent) {}
}

/// Forwards events to `tracing`
#[derive(Debug, Default)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn notify(&self, event: &StepEvent) {
        match event {
            StepEvent::Started { step, attempt, .. } => {
                tracing::info!(step = %step, attempt, "Step started");
            }
            StepEvent::RetryScheduled {
                step,
                attempt,
                max_attempts,
                delay,
                error,
            } => {
                tracing::warn!(
                    step = %step,
                    attempt,
                    max_attempts,
                    delay_secs = delay.as_secs(),
                    error = %error,
                    "Retryable error, will retry"
                );
            }
            StepEvent::Ignored { step, error } => {
                tracing::info!(step = %step, error = %error, "Effect already holds, continuing");
            }
            StepEvent::Succeeded { step, attempts, .. } => {
                tracing::info!(step = %step, attempts, "Step succeeded");
            }
            StepEvent::Failed {
                step,
                attempts,
                error,
                ..
            } => {
                tracing::error!(step = %step, attempts, error = %error, "Step failed");
            }
        }
    }
}

/// Records every event, for inspection after a run
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<StepEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<StepEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl Observer for RecordingObserver {
    fn notify(&self, event: &StepEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
