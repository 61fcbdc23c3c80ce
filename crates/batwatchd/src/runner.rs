//! Command Runner Trait Abstraction
//!
//! Everything batwatchd does to the host goes through `CommandRunner`:
//! - `SystemCommandRunner` spawns real processes (`ip`, `batctl`, `systemctl`)
//! - `FakeCommandRunner` returns scripted output and records every call
//!
//! Failures are `ActionError`s, never panics, so the control loop can absorb
//! them.

use async_trait::async_trait;
use batwatch_common::ActionError;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

// ============================================================================
// Command Output
// ============================================================================

/// Captured result of a finished process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Render a program and its arguments the way they would be typed
pub fn command_line(program: &str, args: &[&str]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

// ============================================================================
// Command Runner Trait
// ============================================================================

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, giving up after `timeout`.
    ///
    /// A non-zero exit is still `Ok`; callers that care use `run_checked`.
    async fn run(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<CommandOutput, ActionError>;

    /// Run and require a zero exit status, returning stdout
    async fn run_checked(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<String, ActionError> {
        let output = self.run(program, args, timeout).await?;
        if output.success() {
            Ok(output.stdout)
        } else {
            Err(ActionError::NonZeroExit {
                command: command_line(program, args),
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            })
        }
    }
}

// ============================================================================
// System Command Runner (Production)
// ============================================================================

/// Spawns real processes with tokio
#[derive(Debug, Clone, Default)]
pub struct SystemCommandRunner;

impl SystemCommandRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<CommandOutput, ActionError> {
        debug!("Executing: {}", command_line(program, args));

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Dropping the output future on timeout kills the child.
        let output = match tokio::time::timeout(timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                let reason = if e.kind() == ErrorKind::NotFound {
                    "command not found".to_string()
                } else {
                    e.to_string()
                };
                return Err(ActionError::ToolMissing {
                    program: program.to_string(),
                    reason,
                });
            }
            Err(_) => {
                return Err(ActionError::Timeout {
                    program: program.to_string(),
                    timeout,
                })
            }
        };

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

// ============================================================================
// Fake Command Runner (Testing)
// ============================================================================

/// One invocation seen by `FakeCommandRunner`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub command: String,
    pub timeout: Duration,
}

/// Scripted runner for tests.
///
/// Lookup order: exact command line, then program name, then the default
/// response (a successful run with empty output).
///
/// ```ignore
/// let runner = FakeCommandRunner::new()
///     .respond("batctl meshif bat0 gw_mode", CommandOutput::ok("server\n"))
///     .fail("systemctl restart batman-adv", ActionError::Timeout { .. });
/// ```
#[derive(Debug, Clone)]
pub struct FakeCommandRunner {
    responses: HashMap<String, Result<CommandOutput, ActionError>>,
    program_responses: HashMap<String, Result<CommandOutput, ActionError>>,
    default_response: Result<CommandOutput, ActionError>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl FakeCommandRunner {
    pub fn new() -> Self {
        Self {
            responses: HashMap::new(),
            program_responses: HashMap::new(),
            default_response: Ok(CommandOutput::ok("")),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Script the output for an exact command line
    pub fn respond(mut self, command: &str, output: CommandOutput) -> Self {
        self.responses.insert(command.to_string(), Ok(output));
        self
    }

    /// Script an error for an exact command line
    pub fn fail(mut self, command: &str, error: ActionError) -> Self {
        self.responses.insert(command.to_string(), Err(error));
        self
    }

    /// Every invocation of `program` fails as if it were not installed
    pub fn missing(mut self, program: &str) -> Self {
        self.program_responses.insert(
            program.to_string(),
            Err(ActionError::ToolMissing {
                program: program.to_string(),
                reason: "command not found".to_string(),
            }),
        );
        self
    }

    pub fn default_response(mut self, output: CommandOutput) -> Self {
        self.default_response = Ok(output);
        self
    }

    fn recorded(&self) -> MutexGuard<'_, Vec<RecordedCall>> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Command lines in invocation order
    pub fn calls(&self) -> Vec<String> {
        self.recorded().iter().map(|c| c.command.clone()).collect()
    }

    pub fn recorded_calls(&self) -> Vec<RecordedCall> {
        self.recorded().clone()
    }

    pub fn call_count(&self, command: &str) -> usize {
        self.recorded().iter().filter(|c| c.command == command).count()
    }

    pub fn total_calls(&self) -> usize {
        self.recorded().len()
    }

    pub fn reset_calls(&self) {
        self.recorded().clear();
    }
}

impl Default for FakeCommandRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandRunner for FakeCommandRunner {
    async fn run(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<CommandOutput, ActionError> {
        let command = command_line(program, args);
        self.recorded().push(RecordedCall {
            command: command.clone(),
            timeout,
        });

        self.responses
            .get(&command)
            .or_else(|| self.program_responses.get(program))
            .unwrap_or(&self.default_response)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_fake_records_calls() {
        let runner = FakeCommandRunner::new();
        runner.run("ip", &["link", "show", "bat0"], T).await.unwrap();
        runner.run("ip", &["link", "show", "bat0"], T).await.unwrap();

        assert_eq!(runner.call_count("ip link show bat0"), 2);
        assert_eq!(runner.total_calls(), 2);
        assert_eq!(runner.recorded_calls()[0].timeout, T);
    }

    #[tokio::test]
    async fn test_fake_lookup_order() {
        let runner = FakeCommandRunner::new()
            .missing("batctl")
            .respond("batctl meshif bat0 gw_mode", CommandOutput::ok("server"));

        let out = runner
            .run("batctl", &["meshif", "bat0", "gw_mode"], T)
            .await
            .unwrap();
        assert_eq!(out.stdout, "server");

        let err = runner
            .run("batctl", &["meshif", "bat0", "gateways"], T)
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::ToolMissing { .. }));
    }

    #[tokio::test]
    async fn test_run_checked_rejects_non_zero_exit() {
        let runner = FakeCommandRunner::new().respond(
            "ip link set bat0 up",
            CommandOutput::failed(2, "RTNETLINK answers: Operation not permitted\n"),
        );

        let err = runner
            .run_checked("ip", &["link", "set", "bat0", "up"], T)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ActionError::NonZeroExit {
                command: "ip link set bat0 up".to_string(),
                code: Some(2),
                stderr: "RTNETLINK answers: Operation not permitted".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_system_runner_missing_program() {
        let runner = SystemCommandRunner::new();
        let err = runner
            .run("batwatch-definitely-not-installed", &[], T)
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::ToolMissing { .. }));
    }

    #[test]
    fn test_command_line() {
        assert_eq!(command_line("ip", &["link", "show"]), "ip link show");
        assert_eq!(command_line("true", &[]), "true");
    }
}
