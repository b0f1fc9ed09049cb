//! External process execution.
//!
//! Every tool invocation (ffmpeg, ffprobe, edge-tts) goes through
//! [`CommandRunner`] so that stages can be tested with scripted runners.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

#[cfg(test)]
use mockall::automock;

use crate::error::{MediaError, MediaResult};

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandOutput {
    /// Exit code, `None` if the process was killed by a signal
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output with the given stdout.
    pub fn ok(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given exit code and stderr.
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            stdout: Vec::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Tail of stderr, bounded for logs and error messages.
    pub fn stderr_tail(&self, max_chars: usize) -> String {
        let count = self.stderr.chars().count();
        if count <= max_chars {
            return self.stderr.trim().to_string();
        }
        self.stderr
            .chars()
            .skip(count - max_chars)
            .collect::<String>()
            .trim()
            .to_string()
    }
}

/// Runs an external program to completion.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, killing it if it exceeds `timeout`.
    ///
    /// A non-zero exit is reported through [`CommandOutput::exit_code`],
    /// not as an error.
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> MediaResult<CommandOutput>;
}

/// [`CommandRunner`] backed by real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> MediaResult<CommandOutput> {
        which::which(program).map_err(|_| MediaError::ToolNotFound(program.to_string()))?;

        debug!("Running: {} {}", program, args.join(" "));

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // Dropping the wait future drops the child, which kills it
        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => {
                let output = output?;
                Ok(CommandOutput {
                    exit_code: output.status.code(),
                    stdout: output.stdout,
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                })
            }
            Err(_) => {
                warn!(
                    "{} timed out after {} seconds, killing process",
                    program,
                    timeout.as_secs()
                );
                Err(MediaError::Timeout(timeout.as_secs()))
            }
        }
    }
}
