//! CLI smoke tests for droidforge.
//!
//! These run the binary without an NDK; anything needing one must fail before
//! any build step.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serial_test::serial;
use tempfile::TempDir;

fn droidforge() -> Command {
  let mut cmd = cargo_bin_cmd!("droidforge");
  cmd.env_remove("ANDROID_NDK").env("NO_COLOR", "1");
  cmd
}

/// A directory laid out like an NDK r19+ for the current host.
fn fake_ndk() -> TempDir {
  let temp = TempDir::new().unwrap();
  let host = match std::env::consts::OS {
    "macos" => "darwin",
    other => other,
  };
  std::fs::create_dir_all(
    temp
      .path()
      .join("toolchains/llvm/prebuilt")
      .join(format!("{}-x86_64", host))
      .join("bin"),
  )
  .unwrap();
  temp
}

// =============================================================================
// Help & Version
// =============================================================================

#[test]
fn help_flag_works() {
  droidforge()
    .arg("--help")
    .assert()
    .success()
    .stdout(predicate::str::contains("Usage"));
}

#[test]
fn version_flag_works() {
  droidforge()
    .arg("--version")
    .assert()
    .success()
    .stdout(predicate::str::contains("droidforge"));
}

// =============================================================================
// Argument validation
// =============================================================================

#[test]
fn unknown_architecture_is_rejected() {
  droidforge()
    .args(["build", "--arch", "mips", "--api", "21"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("unknown architecture 'mips'"));
}

#[test]
fn api_level_out_of_range_is_rejected() {
  droidforge()
    .args(["build", "--arch", "arm64", "--api", "30"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("unsupported API level 30"));
}

#[test]
fn non_numeric_api_level_is_rejected() {
  droidforge()
    .args(["env", "--arch", "arm64", "--api", "latest"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("invalid API level"));
}

#[test]
#[serial]
fn missing_ndk_variable_fails_before_building() {
  let out = TempDir::new().unwrap();
  droidforge()
    .args(["build", "--arch", "arm64", "--api", "21", "--out"])
    .arg(out.path())
    .assert()
    .failure()
    .stderr(predicate::str::contains("ANDROID_NDK"));
  assert!(std::fs::read_dir(out.path()).unwrap().next().is_none());
}

#[test]
#[serial]
fn ndk_without_llvm_toolchain_is_rejected() {
  let ndk = TempDir::new().unwrap();
  droidforge()
    .env("ANDROID_NDK", ndk.path())
    .args(["env", "--arch", "arm", "--api", "24"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("NDK r19"));
}

#[test]
#[serial]
fn unknown_package_in_only_is_rejected() {
  let ndk = fake_ndk();
  droidforge()
    .env("ANDROID_NDK", ndk.path())
    .args(["build", "--arch", "arm64", "--api", "21", "--only", "perl"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("unknown package 'perl'"));
}

#[test]
#[serial]
fn missing_tool_scripts_fail_before_any_package() {
  let ndk = fake_ndk();
  let out = TempDir::new().unwrap();
  let tools = TempDir::new().unwrap();
  droidforge()
    .env("ANDROID_NDK", ndk.path())
    .args(["build", "--arch", "x86_64", "--api", "29", "--out"])
    .arg(out.path())
    .arg("--tools-dir")
    .arg(tools.path())
    .assert()
    .failure()
    .stderr(predicate::str::contains("missing tool script"))
    .stderr(predicate::str::contains("c_rehash.py"));
  assert!(std::fs::read_dir(out.path()).unwrap().next().is_none());
}

#[test]
#[serial]
fn errors_are_reported_once() {
  let ndk = TempDir::new().unwrap();
  droidforge()
    .env("ANDROID_NDK", ndk.path())
    .args(["exec", "--arch", "arm64", "--api", "21", "--", "true"])
    .assert()
    .failure()
    .code(1)
    .stderr(predicate::str::contains("✗ Toolchain setup failed"))
    .stderr(predicate::str::contains("Error:").not());
}

// =============================================================================
// Commands
// =============================================================================

#[test]
fn list_shows_packages_in_build_order() {
  let output = droidforge().arg("list").assert().success().get_output().stdout.clone();
  let stdout = String::from_utf8(output).unwrap();

  let ncurses = stdout.find("ncurses").unwrap();
  let readline = stdout.find("readline").unwrap();
  let zlib = stdout.find("zlib").unwrap();
  assert!(ncurses < readline && readline < zlib);
  assert!(stdout.contains("→ ncurses"));
}

#[test]
#[serial]
fn env_prints_shell_exports() {
  let ndk = fake_ndk();
  droidforge()
    .env("ANDROID_NDK", ndk.path())
    .args(["env", "--arch", "arm64", "--api", "21"])
    .assert()
    .success()
    .stdout(predicate::str::contains("export CC="))
    .stdout(predicate::str::contains("aarch64-linux-android21-clang'"))
    .stdout(predicate::str::contains("export READELF="));
}

#[cfg(unix)]
#[test]
#[serial]
fn exec_runs_under_the_derived_environment() {
  let ndk = fake_ndk();
  droidforge()
    .env("ANDROID_NDK", ndk.path())
    .env("DROIDFORGE_LEAK_CHECK", "1")
    .args(["exec", "--arch", "x86", "--api", "23", "--", "/bin/sh", "-c"])
    .arg("echo \"$CC\"; echo \"${DROIDFORGE_LEAK_CHECK:-absent}\"")
    .assert()
    .success()
    .stdout(predicate::str::contains("i686-linux-android23-clang"))
    .stdout(predicate::str::contains("absent"));
}

#[cfg(unix)]
#[test]
#[serial]
fn exec_propagates_exit_code() {
  let ndk = fake_ndk();
  droidforge()
    .env("ANDROID_NDK", ndk.path())
    .args(["exec", "--arch", "arm64", "--api", "21", "--", "/bin/sh", "-c", "exit 7"])
    .assert()
    .code(7);
}
