//! External command execution
//!
//! The executor runs exactly one external invocation per call and reports
//! what happened. It never retries and never interprets error text.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Raw result of one invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    /// Exit code; `None` when the process could not be started or was killed
    pub status: Option<i32>,
}

impl ExecutionResult {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            status: Some(0),
        }
    }

    pub fn failure(status: Option<i32>, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            status,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Some(0)
    }

    /// Error text to classify; falls back to stdout when stderr is empty
    pub fn error_text(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        match self.status {
            Some(code) => format!("exited with status {}", code),
            None => "terminated without an exit status".to_string(),
        }
    }
}

/// Runs one fully resolved operation
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, argv: &[String]) -> ExecutionResult;

    /// Like [`execute`](Self::execute), with `input` written to stdin
    ///
    /// Used for values that must not appear on the command line.
    async fn execute_with_input(&self, argv: &[String], input: &str) -> ExecutionResult {
        let _ = input;
        ExecutionResult::failure(
            None,
            format!("{} cannot read from stdin here", argv.first().map_or("", String::as_str)),
        )
    }
}

/// Executes argv as a child process, capturing stdout and stderr
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor {
    envs: Vec<(String, String)>,
}

impl ProcessExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an environment variable for every invocation
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    async fn run(&self, argv: &[String], input: Option<&str>) -> ExecutionResult {
        let Some((program, args)) = argv.split_first() else {
            return ExecutionResult::failure(None, "empty command");
        };

        let mut cmd = Command::new(program);
        cmd.args(args);
        cmd.envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        cmd.stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!("Running: {}", argv.join(" "));

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return ExecutionResult::failure(None, format!("failed to start {}: {}", program, e));
            }
        };

        if let (Some(input), Some(mut stdin)) = (input, child.stdin.take()) {
            if let Err(e) = stdin.write_all(input.as_bytes()).await {
                tracing::warn!("Could not write to stdin of {}: {}", program, e);
            }
            // Dropping the handle closes stdin so the child sees EOF.
        }

        match child.wait_with_output().await {
            Ok(output) => ExecutionResult {
                stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                status: output.status.code(),
            },
            Err(e) => ExecutionResult::failure(None, format!("failed to wait for {}: {}", program, e)),
        }
    }
}

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn execute(&self, argv: &[String]) -> ExecutionResult {
        self.run(argv, None).await
    }

    async fn execute_with_input(&self, argv: &[String], input: &str) -> ExecutionResult {
        self.run(argv, Some(input)).await
    }
}
