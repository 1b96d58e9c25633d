//! External tool invocation.
//!
//! Every subprocess the orchestrator starts (configure scripts, make, cmake, gpg,
//! patch) goes through a [`ToolRunner`]. The runner receives the complete
//! environment for the child explicitly; the child inherits nothing else from this
//! process, and this process's own environment is never modified.

use std::fmt;
use std::path::Path;
use std::process::Stdio;

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::toolchain::EnvironmentMap;

/// A program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
  pub program: String,
  pub args: Vec<String>,
  /// Collect stdout/stderr instead of streaming them to the terminal.
  pub capture: bool,
}

impl ToolCommand {
  pub fn new(program: impl Into<String>) -> Self {
    Self {
      program: program.into(),
      args: Vec::new(),
      capture: false,
    }
  }

  pub fn arg(mut self, arg: impl Into<String>) -> Self {
    self.args.push(arg.into());
    self
  }

  pub fn args<I, S>(mut self, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.args.extend(args.into_iter().map(Into::into));
    self
  }

  pub fn capture(mut self) -> Self {
    self.capture = true;
    self
  }
}

impl fmt::Display for ToolCommand {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", shell_quote(&self.program))?;
    for arg in &self.args {
      write!(f, " {}", shell_quote(arg))?;
    }
    Ok(())
  }
}

fn shell_quote(word: &str) -> String {
  let plain = !word.is_empty()
    && word
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
  if plain {
    word.to_string()
  } else {
    format!("'{}'", word.replace('\'', r"'\''"))
  }
}

/// Exit status and captured output of a finished tool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
  /// Exit code, `None` if the process was killed by a signal.
  pub code: Option<i32>,
  pub stdout: String,
  pub stderr: String,
}

impl ToolOutput {
  pub fn success(&self) -> bool {
    self.code == Some(0)
  }
}

#[derive(Debug, Error)]
pub enum RunError {
  #[error("failed to start '{program}': {source}")]
  Spawn {
    program: String,
    #[source]
    source: std::io::Error,
  },
}

/// Capability to run an external tool to completion.
///
/// Implementations block the caller until the tool exits; a non-zero exit is
/// reported through [`ToolOutput::code`], not as an error.
#[allow(async_fn_in_trait)]
pub trait ToolRunner {
  async fn run(&self, command: &ToolCommand, cwd: &Path, env: &EnvironmentMap) -> Result<ToolOutput, RunError>;
}

/// Runs tools as real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ToolRunner for ProcessRunner {
  async fn run(&self, command: &ToolCommand, cwd: &Path, env: &EnvironmentMap) -> Result<ToolOutput, RunError> {
    debug!(cwd = ?cwd, "running: {}", command);

    let mut child = Command::new(&command.program);
    child
      .args(&command.args)
      .current_dir(cwd)
      .env_clear()
      .envs(env.iter())
      .stdin(Stdio::null());

    let spawn_err = |source| RunError::Spawn {
      program: command.program.clone(),
      source,
    };

    if command.capture {
      let output = child.output().await.map_err(spawn_err)?;
      let result = ToolOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
      };
      if !result.success() && !result.stderr.is_empty() {
        debug!(stderr = %result.stderr, "command stderr");
      }
      Ok(result)
    } else {
      let status = child.status().await.map_err(spawn_err)?;
      Ok(ToolOutput {
        code: status.code(),
        ..Default::default()
      })
    }
  }
}
