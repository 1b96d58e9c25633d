use std::path::PathBuf;

use crate::consts::{APP_NAME, CACHE_ENV_VAR, OUT_ENV_VAR};

/// Returns the user's home directory
#[cfg(windows)]
pub fn home_dir() -> Option<PathBuf> {
  std::env::var_os("USERPROFILE").map(PathBuf::from)
}

/// Returns the user's home directory
#[cfg(not(windows))]
pub fn home_dir() -> Option<PathBuf> {
  std::env::var_os("HOME").map(PathBuf::from)
}

/// Returns the directory holding downloaded archives and signatures.
///
/// `DROIDFORGE_CACHE` wins, then the platform cache directory. Falls back to
/// `.cache` under the current directory when no home directory is known.
#[cfg(windows)]
pub fn cache_dir() -> PathBuf {
  if let Some(dir) = std::env::var_os(CACHE_ENV_VAR) {
    return PathBuf::from(dir);
  }
  std::env::var_os("LOCALAPPDATA")
    .map(|dir| PathBuf::from(dir).join(APP_NAME).join("Cache"))
    .unwrap_or_else(|| PathBuf::from(".cache").join(APP_NAME))
}

/// Returns the directory holding downloaded archives and signatures.
///
/// `DROIDFORGE_CACHE` wins, then `XDG_CACHE_HOME`, then `~/.cache`. Falls back to
/// `.cache` under the current directory when no home directory is known.
#[cfg(not(windows))]
pub fn cache_dir() -> PathBuf {
  if let Some(dir) = std::env::var_os(CACHE_ENV_VAR) {
    return PathBuf::from(dir);
  }
  let cache_home = std::env::var_os("XDG_CACHE_HOME")
    .map(PathBuf::from)
    .or_else(|| home_dir().map(|home| home.join(".cache")))
    .unwrap_or_else(|| PathBuf::from(".cache"));
  cache_home.join(APP_NAME)
}

/// Returns the build output root, `DROIDFORGE_OUT` or `./build`.
pub fn out_dir() -> PathBuf {
  std::env::var_os(OUT_ENV_VAR)
    .map(PathBuf::from)
    .unwrap_or_else(|| PathBuf::from("build"))
}
