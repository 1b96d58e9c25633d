//! Package declarations.
//!
//! A [`Package`] is plain data: a name and version, where its sources come from,
//! who may sign them, which patches apply, and a [`PackageKind`] tag selecting the
//! recipe that turns a [`RecipeContext`] into [`BuildStep`]s. Recipes never run
//! anything themselves; the pipeline executes the steps they return.
//!
//! - [`recipes`] - the per-kind build procedures
//! - [`registry`] - the packages built by default, in build order
//! - [`order`] - startup validation of the declared order

pub mod order;
pub mod recipes;
mod registry;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::ApiLevel;
use crate::platform::TargetArch;
use crate::source::{Patch, SourceSpec};
use crate::sysroot::Sysroot;
use crate::toolchain::{EnvironmentMap, Ndk};

pub use order::{OrderError, select, validate_order};
pub use registry::registry;

/// Selects the recipe a package builds with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageKind {
  Bzip2,
  Gdbm,
  Libffi,
  Libuuid,
  Ncurses,
  Openssl,
  Readline,
  Sqlite,
  /// Copies auxiliary scripts into the sysroot; builds nothing.
  Tools,
  Xz,
  Zlib,
  /// A fixed list of steps, independent of the target.
  Script(Vec<BuildStep>),
}

/// One unit of work in a recipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStep {
  /// Run `program` in the source tree under the base environment plus `env`.
  Cmd {
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
  },
  /// Copy a file into the sysroot; `to` is relative to the sysroot root.
  Copy { from: PathBuf, to: PathBuf },
}

impl BuildStep {
  pub fn cmd<I, S>(program: impl Into<String>, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self::Cmd {
      program: program.into(),
      args: args.into_iter().map(Into::into).collect(),
      env: BTreeMap::new(),
    }
  }

  /// Set an extra variable for this step. No effect on `Copy` steps.
  pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    if let Self::Cmd { env, .. } = &mut self {
      env.insert(key.into(), value.into());
    }
    self
  }

  /// Short name used in logs and errors, e.g. `make install` or `sh ./configure`.
  pub fn label(&self) -> String {
    match self {
      Self::Cmd { program, args, .. } => match args.first() {
        Some(first) if !first.starts_with('-') => format!("{} {}", program, first),
        _ => program.clone(),
      },
      Self::Copy { to, .. } => format!("copy {}", to.display()),
    }
  }
}

impl fmt::Display for BuildStep {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Cmd { program, args, .. } => {
        write!(f, "{}", program)?;
        for arg in args {
          write!(f, " {}", arg)?;
        }
        Ok(())
      }
      Self::Copy { from, to } => write!(f, "copy {} -> {}", from.display(), to.display()),
    }
  }
}

/// Everything a recipe may look at.
#[derive(Debug, Clone, Copy)]
pub struct RecipeContext<'a> {
  pub arch: TargetArch,
  pub api_level: ApiLevel,
  pub ndk: &'a Ndk,
  /// The base environment derived for this target.
  pub env: &'a EnvironmentMap,
  pub sysroot: &'a Sysroot,
  /// Directory holding the auxiliary scripts.
  pub tools_dir: &'a Path,
}

/// A declared build unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
  pub kind: PackageKind,
  pub name: String,
  pub version: String,
  pub sources: Vec<SourceSpec>,
  /// Fingerprints of PGP keys trusted to sign the sources.
  pub keys: Vec<String>,
  pub patches: Vec<Patch>,
  /// Packages that must install before this one.
  pub depends_on: Vec<String>,
}

impl Package {
  pub fn new(name: impl Into<String>, version: impl Into<String>, kind: PackageKind) -> Self {
    Self {
      kind,
      name: name.into(),
      version: version.into(),
      sources: Vec::new(),
      keys: Vec::new(),
      patches: Vec::new(),
      depends_on: Vec::new(),
    }
  }

  pub fn source(mut self, spec: SourceSpec) -> Self {
    self.sources.push(spec);
    self
  }

  pub fn key(mut self, fingerprint: impl Into<String>) -> Self {
    self.keys.push(fingerprint.into());
    self
  }

  pub fn patch(mut self, patch: Patch) -> Self {
    self.patches.push(patch);
    self
  }

  pub fn depends_on(mut self, name: impl Into<String>) -> Self {
    self.depends_on.push(name.into());
    self
  }

  /// The build steps for this package under `ctx`.
  pub fn steps(&self, ctx: &RecipeContext<'_>) -> Vec<BuildStep> {
    recipes::steps(&self.kind, ctx)
  }
}

impl fmt::Display for Package {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {}", self.name, self.version)
  }
}
