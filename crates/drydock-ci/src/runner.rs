//! Build command execution.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;

use crate::error::{ExecutionError, Result};
use crate::stage::BuildCommand;

/// Captured output is truncated to its last 64 KiB.
const MAX_CAPTURE_BYTES: usize = 64 * 1024;

/// Result of running a build command to completion.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Exit code (-1 when killed by a signal).
    pub exit_code: i32,

    /// Captured stdout (tail).
    pub stdout: String,

    /// Captured stderr (tail).
    pub stderr: String,

    /// Wall-clock duration.
    pub duration: Duration,
}

impl CommandResult {
    /// Whether the command passed (exit code 0).
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs build commands as scoped subprocesses.
pub struct CommandRunner;

impl CommandRunner {
    /// Run `command` in `work_dir` until it exits or times out.
    ///
    /// `extra_env` is applied after the command's own environment. The child
    /// is killed if the timeout elapses; the working directory is only ever
    /// passed to the child, so the caller's directory is never changed.
    pub async fn execute(
        command: &BuildCommand,
        work_dir: &Path,
        extra_env: &[(String, String)],
    ) -> Result<CommandResult> {
        let (program, args) = command
            .argv
            .split_first()
            .ok_or(ExecutionError::EmptyCommand)?;

        let start = Instant::now();
        let child = Command::new(program)
            .args(args)
            .current_dir(work_dir)
            .envs(&command.env)
            .envs(extra_env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExecutionError::Spawn {
                program: program.clone(),
                source,
            })?;

        let output = if command.timeout_secs > 0 {
            tokio::time::timeout(
                Duration::from_secs(command.timeout_secs),
                child.wait_with_output(),
            )
            .await
            .map_err(|_| ExecutionError::TimedOut {
                secs: command.timeout_secs,
            })??
        } else {
            child.wait_with_output().await?
        };

        let result = CommandResult {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: tail(&String::from_utf8_lossy(&output.stdout), MAX_CAPTURE_BYTES),
            stderr: tail(&String::from_utf8_lossy(&output.stderr), MAX_CAPTURE_BYTES),
            duration: start.elapsed(),
        };

        tracing::debug!(
            command = %command.display(),
            exit_code = result.exit_code,
            duration_ms = result.duration.as_millis() as u64,
            "build command exited"
        );

        Ok(result)
    }
}

/// Keep the last `max` bytes of `s`, on a char boundary.
fn tail(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    format!("...truncated...\n{}", &s[start..])
}
