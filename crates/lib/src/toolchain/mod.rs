//! NDK location and toolchain environment derivation.
//!
//! - [`Ndk`] - a located NDK installation with a unified LLVM toolchain (r19+)
//! - [`env`] - the pure `(profile, api level, ndk, sysroot) -> EnvironmentMap` derivation

pub mod env;

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::config::ApiLevel;
use crate::platform::{ArchProfile, Os, TargetArch};
use crate::sysroot::Sysroot;

pub use env::{EnvironmentMap, derive};

/// Errors locating a usable NDK. Like [`crate::config::ConfigError`], these are fatal
/// before any package runs.
#[derive(Debug, Error)]
pub enum ToolchainError {
  #[error("NDK root does not exist: {0}")]
  NdkNotFound(PathBuf),

  #[error("unified LLVM toolchain not found at {0}; requires Android NDK r19 or above")]
  MissingToolchain(PathBuf),

  #[error("unsupported host operating system '{0}'")]
  UnsupportedHost(&'static str),
}

/// A located Android NDK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ndk {
  root: PathBuf,
  host_tag: String,
}

impl Ndk {
  /// Locate the NDK at `root` for the current host.
  pub fn locate(root: &Path) -> Result<Self, ToolchainError> {
    let os = Os::current().ok_or(ToolchainError::UnsupportedHost(std::env::consts::OS))?;
    Self::locate_for_host(root, os)
  }

  /// Locate the NDK at `root`, checking for the prebuilt toolchain of `host`.
  pub fn locate_for_host(root: &Path, host: Os) -> Result<Self, ToolchainError> {
    if !root.is_dir() {
      return Err(ToolchainError::NdkNotFound(root.to_path_buf()));
    }

    let root = dunce::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
    let ndk = Self::from_parts(root, host.ndk_host_tag());

    let bin = ndk.toolchain_bin();
    if !bin.is_dir() {
      return Err(ToolchainError::MissingToolchain(bin));
    }

    debug!(root = ?ndk.root, host = %ndk.host_tag, "located NDK");
    Ok(ndk)
  }

  /// Build an `Ndk` without touching the filesystem.
  pub fn from_parts(root: PathBuf, host_tag: String) -> Self {
    Self { root, host_tag }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn host_tag(&self) -> &str {
    &self.host_tag
  }

  /// `<ndk>/toolchains/llvm/prebuilt/<host>/bin`
  pub fn toolchain_bin(&self) -> PathBuf {
    self
      .root
      .join("toolchains")
      .join("llvm")
      .join("prebuilt")
      .join(&self.host_tag)
      .join("bin")
  }

  /// Unprefixed binutils for one target triple: `<toolchain>/../<triple>/bin`.
  pub fn triple_bin(&self, triple: &str) -> PathBuf {
    let bin = self.toolchain_bin();
    let prebuilt = bin.parent().map(Path::to_path_buf).unwrap_or(bin);
    prebuilt.join(triple).join("bin")
  }

  /// CMake toolchain file shipped with the NDK.
  pub fn cmake_toolchain_file(&self) -> PathBuf {
    self.root.join("build").join("cmake").join("android.toolchain.cmake")
  }
}

/// Locate the NDK and derive the environment in one step.
pub fn derive_env(
  arch: TargetArch,
  api_level: ApiLevel,
  ndk_root: &Path,
  sysroot: &Sysroot,
) -> Result<(Ndk, EnvironmentMap), ToolchainError> {
  let ndk = Ndk::locate(ndk_root)?;
  let profile: &ArchProfile = arch.profile();
  let env = derive(profile, api_level, &ndk, sysroot);
  Ok((ndk, env))
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs;
  use tempfile::TempDir;

  fn fake_ndk(host: Os) -> TempDir {
    let temp = TempDir::new().unwrap();
    let bin = temp
      .path()
      .join("toolchains/llvm/prebuilt")
      .join(host.ndk_host_tag())
      .join("bin");
    fs::create_dir_all(bin).unwrap();
    temp
  }

  #[test]
  fn locate_finds_unified_toolchain() {
    let temp = fake_ndk(Os::Linux);
    let ndk = Ndk::locate_for_host(temp.path(), Os::Linux).unwrap();
    assert!(ndk.toolchain_bin().ends_with("toolchains/llvm/prebuilt/linux-x86_64/bin"));
    assert!(ndk.cmake_toolchain_file().ends_with("build/cmake/android.toolchain.cmake"));
  }

  #[test]
  fn missing_root_is_reported() {
    let temp = TempDir::new().unwrap();
    let err = Ndk::locate_for_host(&temp.path().join("nope"), Os::Linux).unwrap_err();
    assert!(matches!(err, ToolchainError::NdkNotFound(_)));
  }

  #[test]
  fn old_ndk_without_llvm_toolchain_is_rejected() {
    let temp = fake_ndk(Os::MacOs);
    let err = Ndk::locate_for_host(temp.path(), Os::Linux).unwrap_err();
    assert!(matches!(err, ToolchainError::MissingToolchain(_)));
  }

  #[test]
  fn triple_bin_is_sibling_of_toolchain_bin() {
    let ndk = Ndk::from_parts(PathBuf::from("/ndk"), "linux-x86_64".to_string());
    assert_eq!(
      ndk.triple_bin("aarch64-linux-android"),
      PathBuf::from("/ndk/toolchains/llvm/prebuilt/linux-x86_64/aarch64-linux-android/bin")
    );
  }

  #[test]
  fn derive_env_fails_before_deriving_without_toolchain() {
    let temp = TempDir::new().unwrap();
    let sysroot = Sysroot::new(temp.path().join("sysroot")).unwrap();
    let result = derive_env(TargetArch::Arm64, ApiLevel::new(21).unwrap(), temp.path(), &sysroot);
    assert!(matches!(result, Err(ToolchainError::MissingToolchain(_))));
  }
}
