//! Build procedures, one per [`PackageKind`].
//!
//! Every recipe installs with prefix `/usr` into the sysroot via `DESTDIR`.
//! Variables a recipe needs beyond the base environment travel as per-step
//! overlays computed from `ctx.env`.

use std::path::PathBuf;

use crate::consts::INSTALL_PREFIX;
use crate::package::{BuildStep, PackageKind, RecipeContext};

/// Auxiliary scripts the `tools` package copies into `<sysroot>/tools`.
pub const TOOL_SCRIPTS: &[&str] = &["c_rehash.py", "env.sh", "import_all.py", "ssl_test.py"];

pub fn steps(kind: &PackageKind, ctx: &RecipeContext<'_>) -> Vec<BuildStep> {
  match kind {
    PackageKind::Bzip2 => bzip2(ctx),
    PackageKind::Gdbm => gdbm(ctx),
    PackageKind::Libffi => libffi(ctx),
    PackageKind::Libuuid => libuuid(ctx),
    PackageKind::Ncurses => ncurses(ctx),
    PackageKind::Openssl => openssl(ctx),
    PackageKind::Readline => readline(ctx),
    PackageKind::Sqlite => sqlite(ctx),
    PackageKind::Tools => tools(ctx),
    PackageKind::Xz => xz(ctx),
    PackageKind::Zlib => zlib(ctx),
    PackageKind::Script(steps) => steps.clone(),
  }
}

fn prefix_arg() -> String {
  format!("--prefix={}", INSTALL_PREFIX)
}

fn host_arg(ctx: &RecipeContext<'_>) -> String {
  format!("--host={}", ctx.arch.profile().toolchain_triple)
}

fn make_install(ctx: &RecipeContext<'_>) -> BuildStep {
  BuildStep::cmd("make", ["install".to_string(), ctx.sysroot.destdir_arg()])
}

fn autoreconf() -> BuildStep {
  BuildStep::cmd("autoreconf", ["--install", "--verbose", "--force"])
}

/// `sh ./configure --prefix=/usr --host=<triple> <extra>...`
fn configure(ctx: &RecipeContext<'_>, extra: &[&str]) -> BuildStep {
  let mut args = vec!["./configure".to_string(), prefix_arg(), host_arg(ctx)];
  args.extend(extra.iter().map(|a| a.to_string()));
  BuildStep::cmd("sh", args)
}

/// configure, make, make install.
fn autotools(ctx: &RecipeContext<'_>, extra: &[&str]) -> Vec<BuildStep> {
  vec![
    configure(ctx, extra),
    BuildStep::cmd("make", Vec::<String>::new()),
    make_install(ctx),
  ]
}

fn bzip2(ctx: &RecipeContext<'_>) -> Vec<BuildStep> {
  vec![
    BuildStep::cmd(
      "cmake",
      [
        format!("-DCMAKE_TOOLCHAIN_FILE={}", ctx.ndk.cmake_toolchain_file().display()),
        format!("-DANDROID_ABI={}", ctx.arch.profile().abi),
        format!("-DANDROID_PLATFORM=android-{}", ctx.api_level),
        "-DENABLE_STATIC_LIB=ON".to_string(),
        "-DENABLE_SHARED_LIB=OFF".to_string(),
        format!("-DCMAKE_INSTALL_PREFIX={}", INSTALL_PREFIX),
        ".".to_string(),
      ],
    ),
    BuildStep::cmd("make", Vec::<String>::new()),
    make_install(ctx),
  ]
}

fn gdbm(ctx: &RecipeContext<'_>) -> Vec<BuildStep> {
  vec![
    autoreconf(),
    configure(ctx, &["--enable-libgdbm-compat", "--disable-static"]),
    BuildStep::cmd("make", ["V=1"]),
    make_install(ctx),
  ]
}

fn libffi(ctx: &RecipeContext<'_>) -> Vec<BuildStep> {
  let mut steps = vec![autoreconf()];
  steps.extend(autotools(ctx, &["--disable-shared"]));
  steps
}

fn libuuid(ctx: &RecipeContext<'_>) -> Vec<BuildStep> {
  autotools(
    ctx,
    &[
      "--libdir=/usr/lib",
      "--bindir=/usr/bin",
      "--sbindir=/usr/bin",
      "--disable-all-programs",
      "--enable-libuuid",
    ],
  )
}

fn ncurses(ctx: &RecipeContext<'_>) -> Vec<BuildStep> {
  autotools(
    ctx,
    &[
      "--without-ada",
      "--enable-widec",
      "--without-shared",
      "--with-normal",
      "--without-debug",
      "--without-cxx-binding",
      "--enable-warnings",
      "--disable-stripping",
    ],
  )
}

/// OpenSSL locates the NDK compilers itself; it needs clang and the unprefixed
/// binutils on `PATH` instead of the usual `CC`-style variables.
fn openssl(ctx: &RecipeContext<'_>) -> Vec<BuildStep> {
  let profile = ctx.arch.profile();
  let toolchain = ctx.ndk.toolchain_bin();
  let binutils = ctx.ndk.triple_bin(profile.binutils_prefix());

  let env = ctx
    .env
    .prepend_path([toolchain.as_path(), binutils.as_path()])
    .append("CPPFLAGS", &format!("-D__ANDROID_API__={}", ctx.api_level));
  let overlay = |step: BuildStep| {
    step
      .env("PATH", env.get("PATH").unwrap_or_default())
      .env("CPPFLAGS", env.get("CPPFLAGS").unwrap_or_default())
      .env("HASHBANGPERL", "/system/bin/env perl")
  };

  vec![
    overlay(BuildStep::cmd(
      "perl",
      [
        "./Configure".to_string(),
        prefix_arg(),
        "--openssldir=/etc/ssl".to_string(),
        format!("android-{}", ctx.arch),
        "no-shared".to_string(),
        "no-tests".to_string(),
      ],
    )),
    overlay(BuildStep::cmd("make", Vec::<String>::new())),
    overlay(BuildStep::cmd(
      "make",
      [
        "install_sw".to_string(),
        "install_ssldirs".to_string(),
        ctx.sysroot.destdir_arg(),
      ],
    )),
  ]
}

fn readline(ctx: &RecipeContext<'_>) -> Vec<BuildStep> {
  // wcwidth() is broken on bionic before Android P; the configure probe cannot
  // run on the build host.
  let args = [
    "./configure".to_string(),
    "bash_cv_wcwidth_broken=yes".to_string(),
    prefix_arg(),
    host_arg(ctx),
    "--disable-shared".to_string(),
  ];
  vec![
    BuildStep::cmd("sh", args),
    BuildStep::cmd("make", Vec::<String>::new()),
    make_install(ctx),
  ]
}

fn sqlite(ctx: &RecipeContext<'_>) -> Vec<BuildStep> {
  autotools(ctx, &["--disable-shared"])
}

fn tools(ctx: &RecipeContext<'_>) -> Vec<BuildStep> {
  TOOL_SCRIPTS
    .iter()
    .map(|name| BuildStep::Copy {
      from: ctx.tools_dir.join(name),
      to: PathBuf::from("tools").join(name),
    })
    .collect()
}

fn xz(ctx: &RecipeContext<'_>) -> Vec<BuildStep> {
  let mut steps = vec![autoreconf()];
  steps.extend(autotools(ctx, &["--disable-shared"]));
  steps
}

/// zlib's configure ignores `--host` and reads `CHOST`, and it does not honor
/// `CPPFLAGS`.
fn zlib(ctx: &RecipeContext<'_>) -> Vec<BuildStep> {
  let chost = format!("{}-", ctx.arch.profile().toolchain_triple);
  let cflags = [ctx.env.get("CPPFLAGS"), ctx.env.get("CFLAGS")]
    .into_iter()
    .flatten()
    .filter(|v| !v.is_empty())
    .collect::<Vec<_>>()
    .join(" ");

  let with_env = |step: BuildStep| step.env("CHOST", chost.as_str()).env("CFLAGS", cflags.as_str());

  vec![
    with_env(BuildStep::cmd("sh", ["./configure".to_string(), prefix_arg(), "--static".to_string()])),
    with_env(BuildStep::cmd("make", ["libz.a"])),
    with_env(make_install(ctx)),
  ]
}
