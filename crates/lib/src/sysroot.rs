//! The shared install root.
//!
//! Every package of a run installs into one sysroot with `DESTDIR=<root>` and
//! prefix `/usr`, so later packages find headers, libraries and `.pc` files
//! installed by earlier ones. The sysroot is append-only by convention: nothing
//! here deletes files, and the pipeline warns when a package removes any.
//!
//! Install bookkeeping lives in `<root>/.droidforge/installed.json`, one
//! [`InstallRecord`] per package in build order.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

use crate::consts::{INSTALL_PREFIX, SYSROOT_META_DIR};

const INSTALLED_FILE: &str = "installed.json";

/// Errors raised while maintaining the sysroot.
#[derive(Debug, Error)]
pub enum SysrootError {
  #[error("io error at {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to walk sysroot: {0}")]
  Walk(#[from] walkdir::Error),

  #[error("destination escapes the sysroot: {0}")]
  OutsideRoot(PathBuf),

  #[error("corrupt install record {path}: {source}")]
  Record {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> SysrootError + '_ {
  move |source| SysrootError::Io {
    path: path.to_path_buf(),
    source,
  }
}

/// Files one package added to the sysroot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallRecord {
  pub package: String,
  pub version: String,
  /// Paths relative to the sysroot root, sorted.
  pub files: Vec<PathBuf>,
}

/// Size and modification time of a sysroot file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
  pub len: u64,
  pub modified: Option<SystemTime>,
}

/// Sysroot listing keyed by root-relative path.
pub type FileListing = BTreeMap<PathBuf, FileStamp>;

/// Result of comparing two sysroot listings.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct FileDelta {
  pub added: Vec<PathBuf>,
  /// Present before and after, but rewritten in between.
  pub changed: Vec<PathBuf>,
  pub removed: Vec<PathBuf>,
}

impl FileDelta {
  pub fn between(before: &FileListing, after: &FileListing) -> Self {
    let mut delta = Self::default();
    for (path, stamp) in after {
      match before.get(path) {
        None => delta.added.push(path.clone()),
        Some(old) if old != stamp => delta.changed.push(path.clone()),
        Some(_) => {}
      }
    }
    delta.removed = before.keys().filter(|p| !after.contains_key(*p)).cloned().collect();
    delta
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sysroot {
  root: PathBuf,
}

impl Sysroot {
  /// Wrap a sysroot path, made absolute so it can be embedded in compiler flags.
  pub fn new(root: impl AsRef<Path>) -> io::Result<Self> {
    Ok(Self {
      root: std::path::absolute(root.as_ref())?,
    })
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// `<root>/usr`
  pub fn prefix(&self) -> PathBuf {
    self.root.join(INSTALL_PREFIX.trim_start_matches('/'))
  }

  pub fn include_dir(&self) -> PathBuf {
    self.prefix().join("include")
  }

  pub fn lib_dir(&self) -> PathBuf {
    self.prefix().join("lib")
  }

  pub fn bin_dir(&self) -> PathBuf {
    self.prefix().join("bin")
  }

  pub fn pkgconfig_dir(&self) -> PathBuf {
    self.lib_dir().join("pkgconfig")
  }

  /// Auxiliary scripts copied verbatim, outside the `/usr` prefix.
  pub fn tools_dir(&self) -> PathBuf {
    self.root.join("tools")
  }

  fn meta_dir(&self) -> PathBuf {
    self.root.join(SYSROOT_META_DIR)
  }

  /// `DESTDIR=<root>` argument for `make install`.
  pub fn destdir_arg(&self) -> String {
    format!("DESTDIR={}", self.root.display())
  }

  /// Create the directory skeleton that compiler and pkg-config flags point at.
  pub fn prepare(&self) -> Result<(), SysrootError> {
    for dir in [self.include_dir(), self.pkgconfig_dir(), self.bin_dir()] {
      fs::create_dir_all(&dir).map_err(io_err(&dir))?;
    }
    debug!(root = ?self.root, "sysroot prepared");
    Ok(())
  }

  /// Resolve a sysroot-relative destination, rejecting anything that escapes the root.
  pub fn resolve(&self, relative: &Path) -> Result<PathBuf, SysrootError> {
    let escapes = relative
      .components()
      .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes || relative.as_os_str().is_empty() {
      return Err(SysrootError::OutsideRoot(relative.to_path_buf()));
    }
    Ok(self.root.join(relative))
  }

  /// Copy a file into the sysroot byte for byte, preserving permissions.
  pub fn copy_in(&self, from: &Path, to: &Path) -> Result<PathBuf, SysrootError> {
    let dest = self.resolve(to)?;
    if let Some(parent) = dest.parent() {
      fs::create_dir_all(parent).map_err(io_err(parent))?;
    }
    fs::copy(from, &dest).map_err(io_err(from))?;
    debug!(from = ?from, to = ?dest, "copied into sysroot");
    Ok(dest)
  }

  /// All regular files and symlinks in the sysroot, relative to the root.
  ///
  /// Bookkeeping files are excluded. Symlinks are stamped themselves, not their targets.
  pub fn list_files(&self) -> Result<FileListing, SysrootError> {
    let mut files = FileListing::new();
    if !self.root.exists() {
      return Ok(files);
    }

    let walker = WalkDir::new(&self.root)
      .sort_by_file_name()
      .into_iter()
      .filter_entry(|e| e.depth() != 1 || e.file_name() != SYSROOT_META_DIR);

    for entry in walker {
      let entry = entry?;
      if entry.file_type().is_dir() {
        continue;
      }
      let metadata = entry.metadata()?;
      let stamp = FileStamp {
        len: metadata.len(),
        modified: metadata.modified().ok(),
      };
      if let Ok(relative) = entry.path().strip_prefix(&self.root) {
        files.insert(relative.to_path_buf(), stamp);
      }
    }

    Ok(files)
  }

  /// Install records written so far, in build order.
  pub fn installed(&self) -> Result<Vec<InstallRecord>, SysrootError> {
    let path = self.meta_dir().join(INSTALLED_FILE);
    if !path.exists() {
      return Ok(Vec::new());
    }
    let content = fs::read_to_string(&path).map_err(io_err(&path))?;
    serde_json::from_str(&content).map_err(|source| SysrootError::Record { path, source })
  }

  /// The record written for `package` by an earlier build, if any.
  pub fn record_for(&self, package: &str) -> Result<Option<InstallRecord>, SysrootError> {
    Ok(self.installed()?.into_iter().find(|r| r.package == package))
  }

  /// Append an install record. A record for the same package replaces the old one.
  pub fn record_install(&self, record: &InstallRecord) -> Result<(), SysrootError> {
    let dir = self.meta_dir();
    fs::create_dir_all(&dir).map_err(io_err(&dir))?;

    let mut records = self.installed()?;
    records.retain(|r| r.package != record.package);
    records.push(record.clone());

    let path = dir.join(INSTALLED_FILE);
    let content = serde_json::to_string_pretty(&records).map_err(|source| SysrootError::Record {
      path: path.clone(),
      source,
    })?;
    fs::write(&path, format!("{}\n", content)).map_err(io_err(&path))
  }
}
