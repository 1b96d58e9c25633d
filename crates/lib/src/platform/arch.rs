use std::fmt;
use std::str::FromStr;

use crate::config::ConfigError;

/// Static description of an Android CPU/ABI target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchProfile {
  /// Architecture name as given on the command line
  pub name: &'static str,
  /// Clang target triple, without the API level suffix
  pub toolchain_triple: &'static str,
  /// ABI identifier as used by CMake and the APK lib directory
  pub abi: &'static str,
  binutils_prefix: Option<&'static str>,
}

impl ArchProfile {
  /// Prefix of the binutils executables, which may differ from the clang triple.
  pub fn binutils_prefix(&self) -> &'static str {
    self.binutils_prefix.unwrap_or(self.toolchain_triple)
  }
}

const ARM: ArchProfile = ArchProfile {
  name: "arm",
  toolchain_triple: "armv7a-linux-androideabi",
  abi: "armeabi-v7a",
  binutils_prefix: Some("arm-linux-androideabi"),
};

const ARM64: ArchProfile = ArchProfile {
  name: "arm64",
  toolchain_triple: "aarch64-linux-android",
  abi: "arm64-v8a",
  binutils_prefix: None,
};

const X86: ArchProfile = ArchProfile {
  name: "x86",
  toolchain_triple: "i686-linux-android",
  abi: "x86",
  binutils_prefix: None,
};

const X86_64: ArchProfile = ArchProfile {
  name: "x86_64",
  toolchain_triple: "x86_64-linux-android",
  abi: "x86_64",
  binutils_prefix: None,
};

/// Android target architectures a sysroot can be built for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetArch {
  Arm,
  Arm64,
  X86,
  X86_64,
}

impl TargetArch {
  pub const ALL: [TargetArch; 4] = [Self::Arm, Self::Arm64, Self::X86, Self::X86_64];

  /// Resolve an architecture name to its target.
  pub fn resolve(name: &str) -> Result<Self, ConfigError> {
    match name {
      "arm" => Ok(Self::Arm),
      "arm64" => Ok(Self::Arm64),
      "x86" => Ok(Self::X86),
      "x86_64" => Ok(Self::X86_64),
      other => Err(ConfigError::UnknownArchitecture(other.to_string())),
    }
  }

  /// Returns the static toolchain profile for this architecture
  pub fn profile(&self) -> &'static ArchProfile {
    match self {
      Self::Arm => &ARM,
      Self::Arm64 => &ARM64,
      Self::X86 => &X86,
      Self::X86_64 => &X86_64,
    }
  }

  pub fn as_str(&self) -> &'static str {
    self.profile().name
  }
}

impl FromStr for TargetArch {
  type Err = ConfigError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::resolve(s)
  }
}

impl fmt::Display for TargetArch {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}
