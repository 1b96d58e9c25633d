use std::fmt;

/// Host operating systems the NDK ships prebuilt toolchains for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
  Linux,
  MacOs,
  Windows,
}

impl Os {
  /// Detect the current operating system at runtime
  pub fn current() -> Option<Self> {
    match std::env::consts::OS {
      "linux" => Some(Self::Linux),
      "macos" => Some(Self::MacOs),
      "windows" => Some(Self::Windows),
      _ => None,
    }
  }

  /// Returns the lowercase identifier the NDK uses for this OS
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Linux => "linux",
      Self::MacOs => "darwin",
      Self::Windows => "windows",
    }
  }

  /// Directory name of the NDK's prebuilt LLVM toolchain for this host.
  ///
  /// The NDK only ships x86_64 host binaries; Apple silicon runs them under Rosetta.
  pub fn ndk_host_tag(&self) -> String {
    format!("{}-x86_64", self.as_str())
  }
}

impl fmt::Display for Os {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn current_returns_supported_os() {
    assert!(Os::current().is_some(), "Current OS should be supported");
  }

  #[test]
  fn macos_uses_darwin_host_tag() {
    assert_eq!(Os::MacOs.ndk_host_tag(), "darwin-x86_64");
    assert_eq!(Os::Linux.ndk_host_tag(), "linux-x86_64");
  }
}
