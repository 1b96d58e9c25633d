//! The cross-compilation environment.
//!
//! [`derive`] turns an architecture profile, an API level, a located NDK and the
//! sysroot into an [`EnvironmentMap`]. It reads nothing else, so identical inputs
//! always produce identical maps.
//!
//! Maps are values. Recipes that need extra variables build a new map with
//! [`EnvironmentMap::with`] or [`EnvironmentMap::overlay`]; the base map handed to
//! the next package is never touched.

use std::collections::BTreeMap;
use std::path::Path;

use crate::config::ApiLevel;
use crate::consts::BINUTILS;
use crate::platform::ArchProfile;
use crate::sysroot::Sysroot;
use crate::toolchain::Ndk;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentMap(BTreeMap<String, String>);

impl EnvironmentMap {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, key: &str) -> Option<&str> {
    self.0.get(key).map(String::as_str)
  }

  pub fn contains(&self, key: &str) -> bool {
    self.0.contains_key(key)
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
    self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
  }

  pub fn keys(&self) -> impl Iterator<Item = &str> {
    self.0.keys().map(String::as_str)
  }

  fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
    self.0.insert(key.into(), value.into());
  }

  /// Returns a copy with `key` set to `value`.
  pub fn with(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
    let mut next = self.clone();
    next.insert(key, value);
    next
  }

  /// Returns a copy with every variable of `other` applied on top.
  pub fn overlay(&self, other: &BTreeMap<String, String>) -> Self {
    let mut next = self.clone();
    for (key, value) in other {
      next.insert(key.clone(), value.clone());
    }
    next
  }

  /// Returns a copy with `suffix` appended to `key`, space separated.
  pub fn append(&self, key: &str, suffix: &str) -> Self {
    let value = match self.get(key) {
      Some(current) if !current.is_empty() => format!("{} {}", current, suffix),
      _ => suffix.to_string(),
    };
    self.with(key, value)
  }

  /// Returns a copy with `dirs` placed in front of `PATH`.
  pub fn prepend_path<'a>(&self, dirs: impl IntoIterator<Item = &'a Path>) -> Self {
    let mut entries: Vec<String> = dirs.into_iter().map(|d| d.to_string_lossy().into_owned()).collect();
    if let Some(current) = self.get("PATH").filter(|p| !p.is_empty()) {
      entries.push(current.to_string());
    }
    let separator = if cfg!(windows) { ";" } else { ":" };
    self.with("PATH", entries.join(separator))
  }

  /// Returns a copy that also carries the named variables from `source`.
  ///
  /// Variables already present in this map win.
  pub fn inherit<I, K, V>(&self, keys: &[&str], source: I) -> Self
  where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
  {
    let mut next = self.clone();
    for (key, value) in source {
      let key = key.into();
      if keys.contains(&key.as_str()) && !next.contains(&key) {
        next.insert(key, value);
      }
    }
    next
  }

  /// POSIX shell `export` lines, one per variable, in key order.
  pub fn to_shell_exports(&self) -> String {
    let mut out = String::new();
    for (key, value) in self.iter() {
      out.push_str(&format!("export {}='{}'\n", key, value.replace('\'', r"'\''")));
    }
    out
  }
}

impl FromIterator<(String, String)> for EnvironmentMap {
  fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
    Self(iter.into_iter().collect())
  }
}

fn path_str(path: &Path) -> String {
  path.to_string_lossy().into_owned()
}

/// Derive the cross-compilation environment for one (architecture, API level) pair.
pub fn derive(profile: &ArchProfile, api_level: ApiLevel, ndk: &Ndk, sysroot: &Sysroot) -> EnvironmentMap {
  let toolchain = ndk.toolchain_bin();
  let clang_prefix = toolchain.join(format!("{}{}", profile.toolchain_triple, api_level));
  let clang_prefix = path_str(&clang_prefix);

  let mut env = EnvironmentMap::new();

  env.insert("CC", format!("{}-clang", clang_prefix));
  env.insert("CXX", format!("{}-clang++", clang_prefix));
  env.insert("CPP", format!("{}-clang -E", clang_prefix));

  env.insert("CPPFLAGS", format!("-I{}", sysroot.include_dir().display()));
  env.insert("CFLAGS", "-fPIC");
  env.insert("CXXFLAGS", "-fPIC");
  env.insert("LDFLAGS", format!("-L{} -pie", sysroot.lib_dir().display()));

  env.insert("PKG_CONFIG_SYSROOT_DIR", path_str(sysroot.root()));
  env.insert("PKG_CONFIG_LIBDIR", path_str(&sysroot.pkgconfig_dir()));

  for tool in BINUTILS {
    let binary = toolchain.join(format!("{}-{}", profile.binutils_prefix(), tool));
    env.insert(tool.to_uppercase(), path_str(&binary));
  }

  env
}
