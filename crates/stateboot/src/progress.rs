//! Terminal progress output
//!
//! Prints one timestamped line per step transition and a summary once the
//! run is over.

use chrono::Local;
use colored::Colorize;
use stateboot_core::{Observer, RunReport, StepEvent, StepState, TracingObserver};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Prints orchestrator events as they arrive
///
/// Events are also forwarded to `tracing` for `--verbose` and `RUST_LOG`.
pub struct ProgressReporter {
    descriptions: Mutex<HashMap<String, String>>,
    log: TracingObserver,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self {
            descriptions: Mutex::new(HashMap::new()),
            log: TracingObserver,
        }
    }

    fn description(&self, step: &str) -> String {
        self.descriptions
            .lock()
            .ok()
            .and_then(|d| d.get(step).cloned())
            .unwrap_or_else(|| step.to_string())
    }

    /// Summary of a finished run
    pub fn print_summary(&self, title: &str, report: &RunReport) {
        let slowest_step = report
            .records
            .iter()
            .filter(|r| r.state == StepState::Succeeded)
            .max_by_key(|r| r.elapsed);
        let total_retries = report.total_retries();
        let error_count = report
            .records
            .iter()
            .filter(|r| r.state == StepState::Failed)
            .count();
        let not_run = report
            .records
            .iter()
            .filter(|r| r.state == StepState::Pending)
            .count();

        println!();
        println!("{}", "═".repeat(44));
        println!("Bootstrap Summary: {}", title.cyan().bold());
        println!("{}", "─".repeat(44));
        println!("Total time:    {}", format_duration(report.elapsed).green());

        if let Some(record) = slowest_step {
            println!(
                "Slowest step:  {} ({})",
                self.description(&record.id),
                format_duration(record.elapsed)
            );
        }

        if total_retries > 0 {
            println!("Retries:       {}", total_retries.to_string().yellow());
        } else {
            println!("Retries:       0");
        }

        if error_count > 0 {
            println!("Errors:        {}", error_count.to_string().red().bold());
        } else {
            println!("Errors:        {}", "0".green());
        }

        if not_run > 0 {
            println!("Not started:   {}", not_run.to_string().yellow());
        }
        println!("{}", "═".repeat(44));
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Observer for ProgressReporter {
    fn notify(&self, event: &StepEvent) {
        self.log.notify(event);
        let timestamp = Local::now().format("%H:%M:%S").to_string();
        match event {
            StepEvent::Started {
                step,
                description,
                attempt,
                ..
            } => {
                if let Ok(mut descriptions) = self.descriptions.lock() {
                    descriptions.insert(step.clone(), description.clone());
                }
                if *attempt == 1 {
                    println!("[{}] {} {}", timestamp.dimmed(), "▶".cyan(), description);
                }
            }
            StepEvent::RetryScheduled {
                step,
                attempt,
                max_attempts,
                delay,
                error,
            } => {
                println!(
                    "[{}] {} {} retry {}/{} in {}: {}",
                    timestamp.dimmed(),
                    "⟳".yellow(),
                    step,
                    attempt + 1,
                    max_attempts,
                    format_duration(*delay),
                    first_line(error).dimmed()
                );
            }
            StepEvent::Ignored { step, error } => {
                println!(
                    "[{}] {} {} already in place ({})",
                    timestamp.dimmed(),
                    "⏭".yellow(),
                    self.description(step),
                    first_line(error).dimmed()
                );
            }
            StepEvent::Succeeded {
                step,
                attempts,
                elapsed,
            } => {
                let duration_str = format_duration(*elapsed);
                if *attempts > 1 {
                    println!(
                        "[{}] {} {} ({}, {} retries)",
                        timestamp.dimmed(),
                        "✓".green().bold(),
                        self.description(step),
                        duration_str.dimmed(),
                        attempts - 1
                    );
                } else {
                    println!(
                        "[{}] {} {} ({})",
                        timestamp.dimmed(),
                        "✓".green().bold(),
                        self.description(step),
                        duration_str.dimmed()
                    );
                }
            }
            StepEvent::Failed { step, error, .. } => {
                println!(
                    "[{}] {} {}: {}",
                    timestamp.dimmed(),
                    "✗".red().bold(),
                    self.description(step),
                    first_line(error).red()
                );
            }
        }
    }
}

fn first_line(text: &str) -> &str {
    text.lines().find(|l| !l.trim().is_empty()).unwrap_or(text).trim()
}

/// Duration in a human-readable form
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let millis = duration.subsec_millis();

    if total_secs >= 60 {
        let minutes = total_secs / 60;
        let secs = total_secs % 60;
        format!("{}m {}s", minutes, secs)
    } else if total_secs >= 1 {
        format!("{}.{}s", total_secs, millis / 100)
    } else {
        format!("{}ms", millis)
    }
}
