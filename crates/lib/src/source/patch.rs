//! Patch application.
//!
//! Applying a patch is not idempotent; [`super::SourceHandle`] records applied
//! patches in the tree's marker so a materialized tree is never patched twice.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::runner::{ToolCommand, ToolRunner};
use crate::source::SourceError;
use crate::toolchain::EnvironmentMap;

/// A unified diff applied with `-p1` against an extracted tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
  pub name: String,
  pub path: PathBuf,
}

impl Patch {
  /// `path` is made absolute against the current directory, since `patch` runs
  /// inside the source tree.
  pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
    let path = path.into();
    Self {
      name: name.into(),
      path: std::path::absolute(&path).unwrap_or(path),
    }
  }
}

/// Apply one patch inside `tree`. Conflicts and rejects fail with a patch error.
pub async fn apply_patch<R: ToolRunner>(
  runner: &R,
  patch: &Patch,
  tree: &Path,
  env: &EnvironmentMap,
) -> Result<(), SourceError> {
  let failure = |message: String| SourceError::Patch {
    patch: patch.name.clone(),
    message,
  };

  if !patch.path.is_file() {
    return Err(failure(format!("patch file not found: {}", patch.path.display())));
  }

  let command = ToolCommand::new("patch")
    .args(["-p1", "--forward", "--batch", "-i"])
    .arg(patch.path.to_string_lossy())
    .capture();

  let output = runner
    .run(&command, tree, env)
    .await
    .map_err(|e| failure(e.to_string()))?;

  if !output.success() {
    let detail = if output.stdout.trim().is_empty() {
      output.stderr.trim()
    } else {
      output.stdout.trim()
    };
    return Err(failure(format!("patch exited with {:?}: {}", output.code, detail)));
  }

  info!(patch = %patch.name, tree = ?tree, "patch applied");
  Ok(())
}
