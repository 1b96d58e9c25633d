//! Source materialization.
//!
//! A [`SourceHandle`] takes one declared [`SourceSpec`] from nothing to a source
//! tree on disk:
//!
//! ```text
//! NotFetched -> Fetched -> Verified -> Extracted -> Patched
//! ```
//!
//! Archives are cached in a shared download directory and never fetched twice.
//! Extracted trees persist across runs. A tree carries a marker naming the source,
//! the digest and signature it was verified against, the trusted keys and the
//! patches applied to it. Only a tree whose marker matches the declaration in
//! full is reused without touching the archive again.
//!
//! # Submodules
//!
//! - [`fetch`] - HTTP download
//! - [`verify`] - SHA-256 and PGP signature checks
//! - [`extract`] - tarball unpacking
//! - [`patch`] - patch application

pub mod extract;
pub mod fetch;
pub mod patch;
pub mod verify;

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info};

use crate::consts::SOURCE_MARKER;
use crate::runner::ToolRunner;
use crate::toolchain::EnvironmentMap;

pub use patch::Patch;

const CPYTHON_DEPS_DEFAULT_ORG: &str = "python";
const MARKER_VERSION: u32 = 2;

/// Errors raised while materializing a source.
#[derive(Debug, Error)]
pub enum SourceError {
  #[error("fetch failed for {url}: {message}")]
  Fetch { url: String, message: String },

  #[error("verification failed for {archive}: {message}")]
  Verification { archive: PathBuf, message: String },

  #[error("extraction failed for {archive}: {message}")]
  Extraction { archive: PathBuf, message: String },

  #[error("patch '{patch}' failed: {message}")]
  Patch { patch: String, message: String },

  #[error("source is {found}, expected {expected}")]
  InvalidState { expected: SourceState, found: SourceState },

  #[error("io error at {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to create HTTP client: {0}")]
  Client(String),
}

/// Where a package's source archive comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
  /// A tag of the `cpython-source-deps` repository of a GitHub organization.
  CPythonDeps { tag: String, organization: String },

  /// A plain archive URL with an optional detached signature and digest.
  Url {
    url: String,
    signature_suffix: Option<String>,
    sha256: Option<String>,
  },
}

impl SourceSpec {
  pub fn cpython_deps(tag: impl Into<String>) -> Self {
    Self::CPythonDeps {
      tag: tag.into(),
      organization: CPYTHON_DEPS_DEFAULT_ORG.to_string(),
    }
  }

  pub fn url(url: impl Into<String>) -> Self {
    Self::Url {
      url: url.into(),
      signature_suffix: None,
      sha256: None,
    }
  }

  /// Fetch from a fork of `cpython-source-deps` instead of `python`'s.
  pub fn organization(self, org: impl Into<String>) -> Self {
    match self {
      Self::CPythonDeps { tag, .. } => Self::CPythonDeps {
        tag,
        organization: org.into(),
      },
      other => other,
    }
  }

  /// Declare a detached signature at `<url><suffix>`, e.g. `.asc`.
  pub fn signed(self, suffix: impl Into<String>) -> Self {
    match self {
      Self::Url { url, sha256, .. } => Self::Url {
        url,
        signature_suffix: Some(suffix.into()),
        sha256,
      },
      other => other,
    }
  }

  pub fn sha256(self, digest: impl Into<String>) -> Self {
    match self {
      Self::Url {
        url, signature_suffix, ..
      } => Self::Url {
        url,
        signature_suffix,
        sha256: Some(digest.into()),
      },
      other => other,
    }
  }

  pub fn archive_url(&self) -> String {
    match self {
      Self::CPythonDeps { tag, organization } => {
        format!("https://github.com/{}/cpython-source-deps/archive/{}.tar.gz", organization, tag)
      }
      Self::Url { url, .. } => url.clone(),
    }
  }

  pub fn signature_url(&self) -> Option<String> {
    match self {
      Self::Url {
        url,
        signature_suffix: Some(suffix),
        ..
      } => Some(format!("{}{}", url, suffix)),
      _ => None,
    }
  }

  pub fn pinned_sha256(&self) -> Option<&str> {
    match self {
      Self::Url { sha256, .. } => sha256.as_deref(),
      Self::CPythonDeps { .. } => None,
    }
  }

  /// File name of the cached archive.
  pub fn archive_name(&self) -> String {
    match self {
      Self::CPythonDeps { tag, organization } => format!("{}-{}.tar.gz", organization, tag),
      Self::Url { url, .. } => fetch::url_to_filename(url),
    }
  }

  /// Directory name of the extracted tree.
  pub fn tree_name(&self) -> String {
    match self {
      Self::CPythonDeps { tag, .. } => tag.clone(),
      Self::Url { .. } => {
        let name = self.archive_name();
        [".tar.gz", ".tgz", ".tar"]
          .iter()
          .find_map(|ext| name.strip_suffix(ext))
          .map(str::to_string)
          .unwrap_or(name)
      }
    }
  }
}

impl fmt::Display for SourceSpec {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.archive_url())
  }
}

/// Lifecycle of a source handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SourceState {
  NotFetched,
  Fetched,
  Verified,
  Extracted,
  Patched,
}

impl fmt::Display for SourceState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Self::NotFetched => "not fetched",
      Self::Fetched => "fetched",
      Self::Verified => "verified",
      Self::Extracted => "extracted",
      Self::Patched => "patched",
    };
    write!(f, "{}", name)
  }
}

/// Marker file content recording what a source tree was materialized from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMarker {
  pub version: u32,
  pub source: String,
  /// Pinned SHA-256 the archive was checked against.
  pub sha256: Option<String>,
  pub signature: Option<String>,
  /// Fingerprints trusted at verification, uppercased and sorted.
  pub keys: Vec<String>,
  pub patches: Vec<String>,
}

fn normalize_keys(keys: &[String]) -> Vec<String> {
  let mut keys: Vec<String> = keys.iter().map(|k| k.replace(' ', "").to_uppercase()).collect();
  keys.sort();
  keys.dedup();
  keys
}

/// One source of one package, bound to its cache and work locations.
#[derive(Debug)]
pub struct SourceHandle {
  spec: SourceSpec,
  archive: PathBuf,
  signature: Option<PathBuf>,
  tree: PathBuf,
  state: SourceState,
  /// Keys the archive was verified against.
  trusted: Vec<String>,
}

impl SourceHandle {
  pub fn new(spec: SourceSpec, downloads_dir: &Path, work_dir: &Path) -> Self {
    let archive = downloads_dir.join(spec.archive_name());
    let signature = spec.signature_url().map(|url| {
      let suffix = url.strip_prefix(&spec.archive_url()).unwrap_or(".sig").to_string();
      downloads_dir.join(format!("{}{}", spec.archive_name(), suffix))
    });
    let tree = work_dir.join(spec.tree_name());

    Self {
      spec,
      archive,
      signature,
      tree,
      state: SourceState::NotFetched,
      trusted: Vec::new(),
    }
  }

  pub fn spec(&self) -> &SourceSpec {
    &self.spec
  }

  pub fn state(&self) -> SourceState {
    self.state
  }

  pub fn archive(&self) -> &Path {
    &self.archive
  }

  pub fn tree(&self) -> &Path {
    &self.tree
  }

  fn require(&self, expected: SourceState) -> Result<(), SourceError> {
    if self.state == expected {
      Ok(())
    } else {
      Err(SourceError::InvalidState {
        expected,
        found: self.state,
      })
    }
  }

  fn marker_path(&self) -> PathBuf {
    self.tree.join(SOURCE_MARKER)
  }

  fn expected_marker(&self, keys: &[String], patches: &[Patch]) -> SourceMarker {
    SourceMarker {
      version: MARKER_VERSION,
      source: self.spec.archive_url(),
      sha256: self.spec.pinned_sha256().map(str::to_lowercase),
      signature: self.spec.signature_url(),
      keys: normalize_keys(keys),
      patches: patches.iter().map(|p| p.name.clone()).collect(),
    }
  }

  /// Read the tree's marker, if the tree exists and carries a readable one.
  pub async fn read_marker(&self) -> Option<SourceMarker> {
    let content = fs::read_to_string(self.marker_path()).await.ok()?;
    serde_json::from_str(&content).ok()
  }

  async fn write_marker(&self, marker: &SourceMarker) -> Result<(), SourceError> {
    let path = self.marker_path();
    let content = serde_json::to_string(marker).map_err(|e| SourceError::Io {
      path: path.clone(),
      source: e.into(),
    })?;
    fs::write(&path, format!("{}\n", content))
      .await
      .map_err(|source| SourceError::Io { path, source })
  }

  /// If the tree on disk was already materialized from this source, verified
  /// against the same digest, signature and `keys`, with exactly `patches`
  /// applied, adopt it and return `true`.
  pub async fn adopt_existing(&mut self, keys: &[String], patches: &[Patch]) -> bool {
    if self.state != SourceState::NotFetched {
      return false;
    }
    match self.read_marker().await {
      Some(marker) if marker == self.expected_marker(keys, patches) => {
        debug!(tree = ?self.tree, "reusing materialized source tree");
        self.state = SourceState::Patched;
        true
      }
      _ => false,
    }
  }

  fn is_cached(&self) -> bool {
    self.archive.is_file() && self.signature.as_ref().is_none_or(|sig| sig.is_file())
  }

  /// Download the archive (and signature) unless already cached.
  ///
  /// A cached archive that fails its pinned digest is fetched again.
  pub async fn download(&mut self, client: &reqwest::Client) -> Result<(), SourceError> {
    if self.state >= SourceState::Fetched {
      return Ok(());
    }

    if self.is_cached() {
      let digest_ok = match self.spec.pinned_sha256() {
        Some(expected) => verify::check_sha256(&self.archive, expected).is_ok(),
        None => true,
      };
      if digest_ok {
        debug!(archive = ?self.archive, "using cached archive");
        self.state = SourceState::Fetched;
        return Ok(());
      }
      debug!(archive = ?self.archive, "cached archive digest mismatch, re-downloading");
    }

    fetch::fetch_url(client, &self.spec.archive_url(), &self.archive).await?;
    if let (Some(url), Some(path)) = (self.spec.signature_url(), &self.signature) {
      fetch::fetch_url(client, &url, path).await?;
    }

    self.state = SourceState::Fetched;
    Ok(())
  }

  /// Check the pinned digest, then the signature against `keys` when any are declared.
  pub async fn verify<R: ToolRunner>(
    &mut self,
    keys: &[String],
    runner: &R,
    env: &EnvironmentMap,
  ) -> Result<(), SourceError> {
    self.require(SourceState::Fetched)?;

    if let Some(expected) = self.spec.pinned_sha256() {
      verify::check_sha256(&self.archive, expected)?;
    }

    if !keys.is_empty() {
      let Some(signature) = &self.signature else {
        return Err(SourceError::Verification {
          archive: self.archive.clone(),
          message: "signing keys declared but no signature URL".to_string(),
        });
      };
      verify::verify_signature(runner, &self.archive, signature, keys, env).await?;
    }

    self.trusted = keys.to_vec();
    self.state = SourceState::Verified;
    Ok(())
  }

  /// Unpack into a fresh tree, replacing any stale tree at the same location.
  pub async fn extract(&mut self) -> Result<PathBuf, SourceError> {
    self.require(SourceState::Verified)?;

    let parent = self.tree.parent().map(Path::to_path_buf).unwrap_or_default();
    fs::create_dir_all(&parent).await.map_err(|source| SourceError::Io {
      path: parent.clone(),
      source,
    })?;

    if fs::try_exists(&self.tree).await.unwrap_or(false) {
      debug!(tree = ?self.tree, "removing stale source tree");
      fs::remove_dir_all(&self.tree).await.map_err(|source| SourceError::Io {
        path: self.tree.clone(),
        source,
      })?;
    }

    let staging = tempfile::Builder::new()
      .prefix(".extract-")
      .tempdir_in(&parent)
      .map_err(|source| SourceError::Io {
        path: parent.clone(),
        source,
      })?;

    let archive = self.archive.clone();
    let dest = staging.path().to_path_buf();
    tokio::task::spawn_blocking(move || extract::unpack_archive(&archive, &dest))
      .await
      .map_err(|e| SourceError::Extraction {
        archive: self.archive.clone(),
        message: e.to_string(),
      })??;

    let staged = staging.keep();
    fs::rename(&staged, &self.tree).await.map_err(|source| SourceError::Io {
      path: self.tree.clone(),
      source,
    })?;

    self.write_marker(&self.expected_marker(&self.trusted, &[])).await?;
    info!(tree = ?self.tree, "source extracted");

    self.state = SourceState::Extracted;
    Ok(self.tree.clone())
  }

  /// Apply `patches` in order, recording each one in the marker as it lands.
  pub async fn apply_patches<R: ToolRunner>(
    &mut self,
    patches: &[Patch],
    runner: &R,
    env: &EnvironmentMap,
  ) -> Result<(), SourceError> {
    self.require(SourceState::Extracted)?;

    let mut marker = self.expected_marker(&self.trusted, &[]);
    for p in patches {
      patch::apply_patch(runner, p, &self.tree, env).await?;
      marker.patches.push(p.name.clone());
      self.write_marker(&marker).await?;
    }

    self.state = SourceState::Patched;
    Ok(())
  }
}
