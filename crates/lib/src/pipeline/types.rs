//! Types for pipeline execution.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::runner::RunError;
use crate::source::SourceError;
use crate::sysroot::SysrootError;
use crate::toolchain::ToolchainError;

/// Errors assembling a pipeline from configuration. Nothing has been built yet.
#[derive(Debug, Error)]
pub enum SetupError {
  #[error(transparent)]
  Toolchain(#[from] ToolchainError),

  #[error(transparent)]
  Client(#[from] SourceError),

  #[error("invalid sysroot path {path}: {source}")]
  Sysroot {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// Where a package is in its single pass through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageStage {
  Declared,
  Downloading,
  Verifying,
  Extracting,
  Patching,
  Building,
  Installed,
}

impl fmt::Display for PackageStage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Self::Declared => "declared",
      Self::Downloading => "downloading",
      Self::Verifying => "verifying",
      Self::Extracting => "extracting",
      Self::Patching => "patching",
      Self::Building => "building",
      Self::Installed => "installed",
    };
    write!(f, "{}", name)
  }
}

/// Errors from a package's build steps.
#[derive(Debug, Error)]
pub enum BuildError {
  /// An external tool exited non-zero, or was killed by a signal.
  #[error("step '{step}' of {package} failed with exit code {code:?}")]
  StepFailed {
    package: String,
    step: String,
    code: Option<i32>,
  },

  #[error(transparent)]
  Run(#[from] RunError),

  #[error(transparent)]
  Sysroot(#[from] SysrootError),
}

/// What went wrong inside a failed stage.
#[derive(Debug, Error)]
pub enum StageError {
  #[error(transparent)]
  Source(#[from] SourceError),

  #[error(transparent)]
  Build(#[from] BuildError),
}

/// A pipeline run aborted. Packages installed before the failure stay in the sysroot.
#[derive(Debug, Error)]
pub enum PipelineError {
  #[error("failed to prepare sysroot: {0}")]
  Prepare(#[source] SysrootError),

  #[error("{package} failed while {stage}: {source}")]
  Package {
    package: String,
    stage: PackageStage,
    #[source]
    source: StageError,
  },
}

impl PipelineError {
  /// Name of the failing package, if the failure belongs to one.
  pub fn package(&self) -> Option<&str> {
    match self {
      Self::Prepare(_) => None,
      Self::Package { package, .. } => Some(package),
    }
  }

  pub fn stage(&self) -> Option<PackageStage> {
    match self {
      Self::Prepare(_) => None,
      Self::Package { stage, .. } => Some(*stage),
    }
  }
}

/// Result of building one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageOutcome {
  pub name: String,
  pub version: String,
  /// Sources were already materialized and nothing was fetched or extracted.
  pub reused_sources: bool,
  pub files_installed: usize,
  pub duration: Duration,
}

/// Result of a successful pipeline run, in build order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
  pub packages: Vec<PackageOutcome>,
}

impl RunReport {
  pub fn total_duration(&self) -> Duration {
    self.packages.iter().map(|p| p.duration).sum()
  }

  pub fn files_installed(&self) -> usize {
    self.packages.iter().map(|p| p.files_installed).sum()
  }
}
