//! The packages a sysroot is built from.

use crate::package::{Package, PackageKind};
use crate::source::SourceSpec;

const FORK: &str = "yan12125";
const NCURSES_KEY: &str = "C52048C0C0748FEE227D47A2702353E0F7E48EDB";

/// Every package, in build order.
///
/// ncurses comes first because readline's configure probes for it through the
/// sysroot's pkg-config path.
pub fn registry() -> Vec<Package> {
  vec![
    Package::new("ncurses", "6.1", PackageKind::Ncurses)
      .source(
        SourceSpec::url("https://invisible-mirror.net/archives/ncurses/ncurses-6.1.tar.gz").signed(".asc"),
      )
      .key(NCURSES_KEY),
    Package::new("bzip2", "1.0.6", PackageKind::Bzip2).source(SourceSpec::cpython_deps("bzip2").organization(FORK)),
    Package::new("gdbm", "1.18.1", PackageKind::Gdbm).source(SourceSpec::cpython_deps("gdbm").organization(FORK)),
    Package::new("libffi", "3.3", PackageKind::Libffi).source(SourceSpec::cpython_deps("libffi")),
    Package::new("libuuid", "2.34", PackageKind::Libuuid)
      .source(SourceSpec::cpython_deps("util-linux").organization(FORK)),
    Package::new("openssl", "1.1.1", PackageKind::Openssl).source(SourceSpec::cpython_deps("openssl-1.1.1")),
    Package::new("readline", "8.0", PackageKind::Readline)
      .source(SourceSpec::cpython_deps("readline").organization(FORK))
      .depends_on("ncurses"),
    Package::new("sqlite", "3.31.1", PackageKind::Sqlite)
      .source(SourceSpec::cpython_deps("sqlite").organization(FORK)),
    Package::new("tools", "0", PackageKind::Tools),
    Package::new("xz", "5.2.4", PackageKind::Xz).source(SourceSpec::cpython_deps("xz")),
    Package::new("zlib", "1.2.11", PackageKind::Zlib).source(SourceSpec::cpython_deps("zlib")),
  ]
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::package::validate_order;

  #[test]
  fn registry_order_is_fixed() {
    let names: Vec<_> = registry().into_iter().map(|p| p.name).collect();
    assert_eq!(
      names,
      vec![
        "ncurses", "bzip2", "gdbm", "libffi", "libuuid", "openssl", "readline", "sqlite", "tools", "xz", "zlib"
      ]
    );
  }

  #[test]
  fn registry_is_a_valid_order() {
    validate_order(&registry()).unwrap();
  }

  #[test]
  fn only_tools_has_no_sources() {
    for pkg in registry() {
      assert_eq!(pkg.sources.is_empty(), pkg.kind == PackageKind::Tools, "{}", pkg.name);
    }
  }

  #[test]
  fn signed_sources_declare_keys() {
    let ncurses = registry().into_iter().find(|p| p.name == "ncurses").unwrap();
    assert!(ncurses.sources[0].signature_url().is_some());
    assert_eq!(ncurses.keys, vec![NCURSES_KEY]);
  }
}
