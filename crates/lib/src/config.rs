//! Run configuration.
//!
//! A [`BuildConfig`] is assembled once at startup from command-line selectors and
//! environment variables, then passed by reference. Nothing downstream reads the
//! process environment again.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

use crate::consts::{MAX_API_LEVEL, MIN_API_LEVEL, NDK_ENV_VAR};
use crate::package::recipes::TOOL_SCRIPTS;
use crate::platform::TargetArch;
use crate::platform::paths;

/// Pre-flight configuration errors. These abort a run before any package starts.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("unknown architecture '{0}' (expected one of: arm, arm64, x86, x86_64)")]
  UnknownArchitecture(String),

  #[error("unsupported API level {0} (expected 21..=29)")]
  UnsupportedApiLevel(u32),

  #[error("invalid API level '{0}': not an integer")]
  InvalidApiLevel(String),

  #[error("requires environment variable ${0} naming the Android NDK root")]
  MissingNdkVariable(&'static str),

  #[error("missing tool script {0} (set --tools-dir)")]
  MissingToolScript(PathBuf),
}

/// An Android API level within the supported range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApiLevel(u32);

impl ApiLevel {
  pub fn new(level: u32) -> Result<Self, ConfigError> {
    if (MIN_API_LEVEL..=MAX_API_LEVEL).contains(&level) {
      Ok(Self(level))
    } else {
      Err(ConfigError::UnsupportedApiLevel(level))
    }
  }

  pub fn get(&self) -> u32 {
    self.0
  }
}

impl FromStr for ApiLevel {
  type Err = ConfigError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let level = s
      .trim()
      .parse::<u32>()
      .map_err(|_| ConfigError::InvalidApiLevel(s.to_string()))?;
    Self::new(level)
  }
}

impl fmt::Display for ApiLevel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Read the NDK root from `$ANDROID_NDK`.
pub fn ndk_root_from_env() -> Result<PathBuf, ConfigError> {
  match std::env::var_os(NDK_ENV_VAR) {
    Some(value) if !value.is_empty() => Ok(PathBuf::from(value)),
    _ => Err(ConfigError::MissingNdkVariable(NDK_ENV_VAR)),
  }
}

/// Everything a run needs to know about where things live.
#[derive(Debug, Clone)]
pub struct BuildConfig {
  pub arch: TargetArch,
  pub api_level: ApiLevel,
  pub ndk_root: PathBuf,
  /// Build output root; each (arch, api) pair gets its own subdirectory.
  pub out_dir: PathBuf,
  /// Shared download cache.
  pub cache_dir: PathBuf,
  /// Directory of auxiliary scripts copied verbatim into the sysroot.
  pub tools_dir: PathBuf,
}

impl BuildConfig {
  /// Create a configuration with default directories.
  pub fn new(arch: TargetArch, api_level: ApiLevel, ndk_root: impl Into<PathBuf>) -> Self {
    Self {
      arch,
      api_level,
      ndk_root: ndk_root.into(),
      out_dir: paths::out_dir(),
      cache_dir: paths::cache_dir(),
      tools_dir: PathBuf::from("tools"),
    }
  }

  pub fn with_out_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.out_dir = dir.into();
    self
  }

  pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.cache_dir = dir.into();
    self
  }

  pub fn with_tools_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.tools_dir = dir.into();
    self
  }

  /// Fail unless every auxiliary script is present in the tools directory.
  pub fn check_tool_scripts(&self) -> Result<(), ConfigError> {
    for name in TOOL_SCRIPTS {
      let path = self.tools_dir.join(name);
      if !path.is_file() {
        return Err(ConfigError::MissingToolScript(path));
      }
    }
    Ok(())
  }

  /// Per-run directory, e.g. `build/arm64-android21`.
  pub fn run_dir(&self) -> PathBuf {
    self.out_dir.join(format!("{}-android{}", self.arch, self.api_level))
  }

  pub fn sysroot_dir(&self) -> PathBuf {
    self.run_dir().join("sysroot")
  }

  /// Extracted source trees for this run; persisted for reuse.
  pub fn work_dir(&self) -> PathBuf {
    self.run_dir().join("src")
  }

  pub fn downloads_dir(&self) -> PathBuf {
    downloads_dir(&self.cache_dir)
  }
}

/// Download directory inside a cache root.
pub fn downloads_dir(cache_dir: &Path) -> PathBuf {
  cache_dir.join("downloads")
}
