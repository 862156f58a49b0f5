//! External command execution
//!
//! Mosaicking, merging and warping are delegated to the GDAL command line tools
//! and uploads to `gsutil`. Commands are built as plain data ([`ToolCommand`])
//! and executed through the [`ToolRunner`] seam so the pipeline never spawns a
//! process directly.

use async_trait::async_trait;
use std::ffi::OsStr;
use std::fmt;
use std::path::Path;
use std::process::Stdio;
use tracing::debug;

pub mod gdal;

/// Longest stderr excerpt kept in an error
const STDERR_EXCERPT_LEN: usize = 2_000;

/// An external program and its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    /// Program name or path
    pub program: String,
    /// Arguments, passed without a shell
    pub args: Vec<String>,
}

impl ToolCommand {
    /// Start a command for `program`
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Append a path argument
    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy().into_owned())
    }

    /// Value following `flag`, if present
    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }

    /// The final argument, which is the output for every GDAL command built here
    pub fn last_arg(&self) -> Option<&str> {
        self.args.last().map(String::as_str)
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " \"{arg}\"")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// External tool errors. Always fatal to the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// The program could not be started
    #[error("failed to launch `{command}`: {message}")]
    Spawn {
        /// Rendered command line
        command: String,
        /// OS error
        message: String,
    },

    /// The program ran and exited unsuccessfully
    #[error("`{command}` exited with {status}: {stderr}")]
    ExitStatus {
        /// Rendered command line
        command: String,
        /// Exit status description
        status: String,
        /// Tail of the program's stderr
        stderr: String,
    },
}

/// Runs external commands to completion
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run `command`, returning once it has exited successfully
    async fn run(&self, command: &ToolCommand) -> Result<(), ToolError>;
}

/// Runs commands as child processes
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    /// Create a process runner
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, command: &ToolCommand) -> Result<(), ToolError> {
        let rendered = command.to_string();
        debug!(command = %rendered, "Running external tool");

        let output = tokio::process::Command::new(OsStr::new(&command.program))
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| ToolError::Spawn {
                command: rendered.clone(),
                message: e.to_string(),
            })?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        let excerpt = match stderr.char_indices().rev().nth(STDERR_EXCERPT_LEN) {
            Some((idx, _)) => &stderr[idx..],
            None => stderr,
        };

        Err(ToolError::ExitStatus {
            command: rendered,
            status: output.status.to_string(),
            stderr: excerpt.to_string(),
        })
    }
}
