//! External process execution.
//!
//! Tools such as `codesign` and `xcodebuild` are opaque to this crate. They
//! are reached through the narrow [`CommandRunner`] capability so tests and
//! other platforms can substitute their own implementation.

use crate::delivery::{Error, Result};
use async_trait::async_trait;
use std::process::Stdio;

/// Captured output of a successful command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs an external command to completion.
///
/// A non-zero exit status is an infrastructure error.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput>;
}

/// [`CommandRunner`] backed by `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioCommandRunner;

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        let command_line = format_command(program, args);

        let resolved = which::which(program).map_err(|e| {
            Error::infrastructure_with(
                format!("Failed to run command: {} ({} not found in PATH)", command_line, program),
                e,
            )
        })?;
        log::debug!("Running {} (resolved to {})", command_line, resolved.display());

        let mut command = tokio::process::Command::new(&resolved);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let output = command.output().await.map_err(|e| {
            Error::infrastructure_with(format!("Failed to run command: {}", command_line), e)
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            let status = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            let mut lines = vec![
                format!("Command exited with status {}.", status),
                format!("Command: {}", command_line),
            ];
            if !stderr.trim().is_empty() {
                lines.push(format!("stderr: {}", stderr.trim()));
            }
            if !stdout.trim().is_empty() {
                lines.push(format!("stdout: {}", stdout.trim()));
            }
            return Err(Error::infrastructure(lines.join("\n")));
        }

        Ok(CommandOutput { stdout, stderr })
    }
}

/// Joins a program and its arguments for log and error messages.
pub fn format_command(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}
