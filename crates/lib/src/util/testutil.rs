//! Test utilities for droidforge-lib.
//!
//! [`RecordingRunner`] stands in for real toolchains: it records every invocation
//! and lets a test decide which commands fail and what they print.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::runner::{RunError, ToolCommand, ToolOutput, ToolRunner};
use crate::toolchain::EnvironmentMap;

/// One recorded tool invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
  pub command: ToolCommand,
  pub cwd: PathBuf,
  pub env: EnvironmentMap,
}

impl Invocation {
  /// The command line, e.g. `make install DESTDIR=/x`.
  pub fn line(&self) -> String {
    self.command.to_string()
  }
}

type Predicate = Box<dyn Fn(&Invocation) -> bool + Send + Sync>;
type Hook = Box<dyn Fn(&Invocation) + Send + Sync>;

#[derive(Default)]
pub struct RecordingRunner {
  calls: Mutex<Vec<Invocation>>,
  failures: Vec<Predicate>,
  responses: Vec<(String, String)>,
  hooks: Vec<Hook>,
}

impl RecordingRunner {
  pub fn new() -> Self {
    Self::default()
  }

  /// Exit with status 1 for invocations matching `predicate`.
  pub fn fail_when(mut self, predicate: impl Fn(&Invocation) -> bool + Send + Sync + 'static) -> Self {
    self.failures.push(Box::new(predicate));
    self
  }

  /// Print `stdout` when `program` runs.
  pub fn respond(mut self, program: &str, stdout: &str) -> Self {
    self.responses.push((program.to_string(), stdout.to_string()));
    self
  }

  /// Run `hook` for every successful invocation, e.g. to fake installed files.
  pub fn on_run(mut self, hook: impl Fn(&Invocation) + Send + Sync + 'static) -> Self {
    self.hooks.push(Box::new(hook));
    self
  }

  pub fn calls(&self) -> Vec<Invocation> {
    self.calls.lock().map(|c| c.clone()).unwrap_or_default()
  }
}

impl ToolRunner for RecordingRunner {
  async fn run(&self, command: &ToolCommand, cwd: &Path, env: &EnvironmentMap) -> Result<ToolOutput, RunError> {
    let invocation = Invocation {
      command: command.clone(),
      cwd: cwd.to_path_buf(),
      env: env.clone(),
    };

    if let Ok(mut calls) = self.calls.lock() {
      calls.push(invocation.clone());
    }

    if self.failures.iter().any(|f| f(&invocation)) {
      return Ok(ToolOutput {
        code: Some(1),
        stdout: String::new(),
        stderr: "simulated failure".to_string(),
      });
    }

    for hook in &self.hooks {
      hook(&invocation);
    }

    let stdout = self
      .responses
      .iter()
      .find(|(program, _)| *program == command.program)
      .map(|(_, out)| out.clone())
      .unwrap_or_default();

    Ok(ToolOutput {
      code: Some(0),
      stdout,
      stderr: String::new(),
    })
  }
}
