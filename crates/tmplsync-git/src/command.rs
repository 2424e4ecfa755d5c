//! Runs the system `git` executable.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::debug;

use crate::context::OpContext;
use crate::retry::RetryConfig;

/// Returns true if `git` can be found on the search path.
pub fn available() -> bool {
    which::which("git").is_ok()
}

/// Captured result of one git invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` if the process was killed by a signal or never started.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Why a command did not succeed.
#[derive(Debug)]
pub enum FailureCause {
    /// Non-zero exit code, `None` when terminated by a signal.
    Exit(Option<i32>),
    /// The process could not be spawned.
    Spawn(std::io::Error),
    /// The operation context was cancelled while the command ran.
    Cancelled,
}

/// A git command that failed, with everything needed for diagnostics.
#[derive(Debug)]
pub struct CommandFailure {
    pub command: String,
    pub output: CommandOutput,
    pub cause: FailureCause,
}

impl CommandFailure {
    fn cancelled(command: String) -> Self {
        Self {
            command,
            output: CommandOutput::default(),
            cause: FailureCause::Cancelled,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.cause, FailureCause::Cancelled)
    }

    /// Command, cause and the trimmed stderr/stdout.
    pub fn details(&self) -> String {
        let cause = match &self.cause {
            FailureCause::Exit(Some(code)) => format!("exit status {code}"),
            FailureCause::Exit(None) => "terminated by signal".to_string(),
            FailureCause::Spawn(e) => format!("cannot start git: {e}"),
            FailureCause::Cancelled => "cancelled".to_string(),
        };
        format!(
            "\"{}\" failed: {}\n\nstderr:\n{}\n\nstdout:\n{}",
            self.command,
            cause,
            self.output.stderr.trim(),
            self.output.stdout.trim()
        )
    }
}

impl fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.details())
    }
}

impl std::error::Error for CommandFailure {}

/// Executes git commands in one working directory.
///
/// Only one command runs at a time, git does not tolerate concurrent
/// invocations on the same working tree. Failed commands are retried
/// with [`RetryConfig`] backoff.
#[derive(Debug)]
pub struct GitRunner {
    binary: PathBuf,
    working_dir: PathBuf,
    retry: RetryConfig,
    lock: Mutex<()>,
}

impl GitRunner {
    pub fn new(binary: impl Into<PathBuf>, working_dir: impl Into<PathBuf>, retry: RetryConfig) -> Self {
        Self {
            binary: binary.into(),
            working_dir: working_dir.into(),
            retry,
            lock: Mutex::new(()),
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Runs the command, retrying failures until the backoff time limit is spent.
    ///
    /// When the context is cancelled, the last real failure is returned if
    /// there was one, otherwise a cancelled failure.
    pub async fn run(&self, ctx: &OpContext, args: &[&str]) -> Result<CommandOutput, CommandFailure> {
        let mut backoff = self.retry.backoff();
        let mut last: Option<CommandFailure> = None;
        loop {
            if ctx.is_cancelled() {
                return Err(last.unwrap_or_else(|| CommandFailure::cancelled(command_line(args))));
            }

            let failure = match self.run_once(ctx, args).await {
                Ok(output) => return Ok(output),
                Err(f) if f.is_cancelled() => return Err(last.unwrap_or(f)),
                Err(f) => f,
            };

            let Some(delay) = backoff.next_backoff() else {
                return Err(failure);
            };
            debug!(
                "Git command \"{}\" failed, retrying in {:?}",
                failure.command, delay
            );
            last = Some(failure);

            tokio::select! {
                _ = tokio::time::sleep(delay) => {},
                _ = ctx.cancelled() => {
                    return Err(last.unwrap_or_else(|| CommandFailure::cancelled(command_line(args))));
                }
            }
        }
    }

    async fn run_once(&self, ctx: &OpContext, args: &[&str]) -> Result<CommandOutput, CommandFailure> {
        let _guard = self.lock.lock().await;
        let command = command_line(args);
        debug!("Running git command: {}", command);

        let mut cmd = Command::new(&self.binary);
        cmd.args(args)
            .current_dir(&self.working_dir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .kill_on_drop(true);

        // Dropping the output future kills the process
        let result = tokio::select! {
            result = cmd.output() => result,
            _ = ctx.cancelled() => return Err(CommandFailure::cancelled(command)),
        };

        let raw = match result {
            Ok(raw) => raw,
            Err(e) => {
                return Err(CommandFailure {
                    command,
                    output: CommandOutput::default(),
                    cause: FailureCause::Spawn(e),
                });
            },
        };

        let output = CommandOutput {
            exit_code: raw.status.code(),
            stdout: String::from_utf8_lossy(&raw.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&raw.stderr).into_owned(),
        };
        if !output.stdout.is_empty() {
            debug!("git stdout: {}", output.stdout.trim_end());
        }
        if !output.stderr.is_empty() {
            debug!("git stderr: {}", output.stderr.trim_end());
        }

        if output.success() {
            Ok(output)
        } else {
            Err(CommandFailure {
                command,
                cause: FailureCause::Exit(output.exit_code),
                output,
            })
        }
    }
}

fn command_line(args: &[&str]) -> String {
    format!("git {}", args.join(" "))
}
