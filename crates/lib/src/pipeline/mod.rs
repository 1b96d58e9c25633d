//! Package build pipeline.
//!
//! [`BuildPipeline::run`] takes packages in the given order, one at a time, and
//! drives each through
//!
//! ```text
//! Declared -> Downloading -> Verifying -> Extracting -> Patching -> Building -> Installed
//! ```
//!
//! The first failure aborts the run. Nothing is rolled back: packages installed
//! before the failure, and whatever the failing package installed before its
//! failing step, stay in the sysroot.
//!
//! Every subprocess receives the base [`EnvironmentMap`] plus its own step's
//! overlay. The base map is never modified, so no package observes variables set
//! for another.

mod types;

pub use types::{BuildError, PackageOutcome, PackageStage, PipelineError, RunReport, SetupError, StageError};

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::{ApiLevel, BuildConfig};
use crate::consts::HOST_PASSTHROUGH;
use crate::package::{BuildStep, Package, RecipeContext};
use crate::platform::TargetArch;
use crate::runner::{ToolCommand, ToolRunner};
use crate::source::fetch::http_client;
use crate::source::{Patch, SourceHandle};
use crate::sysroot::{FileDelta, InstallRecord, Sysroot};
use crate::toolchain::{EnvironmentMap, Ndk, derive_env};

fn failed<E: Into<StageError>>(package: &Package, stage: PackageStage) -> impl FnOnce(E) -> PipelineError + '_ {
  move |e| PipelineError::Package {
    package: package.name.clone(),
    stage,
    source: e.into(),
  }
}

/// Patches belong to the primary tree only.
fn patches_for(package: &Package, index: usize) -> &[Patch] {
  if index == 0 { &package.patches } else { &[] }
}

/// Download the sources of `packages` into `downloads_dir`, skipping cached archives.
///
/// Needs no target; archives are shared by every (architecture, API level) run.
pub async fn fetch_sources(
  client: &reqwest::Client,
  packages: &[Package],
  downloads_dir: &Path,
) -> Result<usize, PipelineError> {
  let mut count = 0;
  for package in packages {
    for spec in &package.sources {
      // The tree location is irrelevant for downloading.
      let mut handle = SourceHandle::new(spec.clone(), downloads_dir, downloads_dir);
      handle
        .download(client)
        .await
        .map_err(failed(package, PackageStage::Downloading))?;
      count += 1;
    }
  }
  info!(archives = count, dir = ?downloads_dir, "sources cached");
  Ok(count)
}

/// Sequences packages for one (architecture, API level) target.
pub struct BuildPipeline<R: ToolRunner> {
  arch: TargetArch,
  api_level: ApiLevel,
  ndk: Ndk,
  env: EnvironmentMap,
  sysroot: Sysroot,
  runner: R,
  client: reqwest::Client,
  downloads_dir: PathBuf,
  work_dir: PathBuf,
  tools_dir: PathBuf,
}

impl<R: ToolRunner> BuildPipeline<R> {
  /// Assemble a pipeline from explicit parts.
  ///
  /// `env` is used as the base environment unchanged.
  pub fn new(
    config: &BuildConfig,
    ndk: Ndk,
    env: EnvironmentMap,
    sysroot: Sysroot,
    runner: R,
    client: reqwest::Client,
  ) -> Self {
    Self {
      arch: config.arch,
      api_level: config.api_level,
      ndk,
      env,
      sysroot,
      runner,
      client,
      downloads_dir: config.downloads_dir(),
      work_dir: config.work_dir(),
      tools_dir: config.tools_dir.clone(),
    }
  }

  /// Locate the NDK, derive the toolchain environment and add the host
  /// pass-through variables (`PATH`, `HOME`, ...) from this process.
  pub fn from_config(config: &BuildConfig, runner: R) -> Result<Self, SetupError> {
    let sysroot_dir = config.sysroot_dir();
    let sysroot = Sysroot::new(&sysroot_dir).map_err(|source| SetupError::Sysroot {
      path: sysroot_dir,
      source,
    })?;
    let (ndk, env) = derive_env(config.arch, config.api_level, &config.ndk_root, &sysroot)?;
    let env = env.inherit(HOST_PASSTHROUGH, std::env::vars());
    let client = http_client()?;
    Ok(Self::new(config, ndk, env, sysroot, runner, client))
  }

  pub fn env(&self) -> &EnvironmentMap {
    &self.env
  }

  pub fn sysroot(&self) -> &Sysroot {
    &self.sysroot
  }

  pub fn runner(&self) -> &R {
    &self.runner
  }

  /// Build `packages` strictly in the given order.
  ///
  /// The order is taken as given; use [`crate::package::validate_order`] first.
  pub async fn run(&self, packages: &[Package]) -> Result<RunReport, PipelineError> {
    self.sysroot.prepare().map_err(PipelineError::Prepare)?;

    let mut report = RunReport::default();
    for package in packages {
      let outcome = self.build_package(package).await?;
      report.packages.push(outcome);
    }

    info!(
      packages = report.packages.len(),
      files = report.files_installed(),
      "pipeline complete"
    );
    Ok(report)
  }

  /// Download the sources of `packages` into the cache without building anything.
  ///
  /// Returns the number of archives now cached.
  pub async fn fetch(&self, packages: &[Package]) -> Result<usize, PipelineError> {
    fetch_sources(&self.client, packages, &self.downloads_dir).await
  }

  async fn build_package(&self, package: &Package) -> Result<PackageOutcome, PipelineError> {
    let started = Instant::now();
    info!(package = %package.name, version = %package.version, "building package");
    debug!(package = %package.name, stage = %PackageStage::Declared, "stage");

    let (tree, reused_sources) = self.materialize(package).await?;

    debug!(package = %package.name, stage = %PackageStage::Building, "stage");
    let before = self
      .sysroot
      .list_files()
      .map_err(BuildError::from)
      .map_err(failed(package, PackageStage::Building))?;

    self
      .run_steps(package, &tree)
      .await
      .map_err(failed(package, PackageStage::Building))?;

    let after = self
      .sysroot
      .list_files()
      .map_err(BuildError::from)
      .map_err(failed(package, PackageStage::Building))?;
    let delta = FileDelta::between(&before, &after);
    if !delta.removed.is_empty() {
      warn!(
        package = %package.name,
        removed = delta.removed.len(),
        first = ?delta.removed.first(),
        "package removed files from the sysroot"
      );
    }

    let previous = self
      .sysroot
      .record_for(&package.name)
      .map_err(BuildError::from)
      .map_err(failed(package, PackageStage::Building))?;

    // Rebuilding into an existing sysroot may rewrite files byte for byte, or
    // skip files that are already up to date; those still belong to the package.
    let mut files: BTreeSet<PathBuf> = delta.added.into_iter().chain(delta.changed).collect();
    if let Some(previous) = previous {
      files.extend(previous.files.into_iter().filter(|f| after.contains_key(f)));
    }

    let record = InstallRecord {
      package: package.name.clone(),
      version: package.version.clone(),
      files: files.into_iter().collect(),
    };
    self
      .sysroot
      .record_install(&record)
      .map_err(BuildError::from)
      .map_err(failed(package, PackageStage::Building))?;

    let duration = started.elapsed();
    info!(
      package = %package.name,
      stage = %PackageStage::Installed,
      files = record.files.len(),
      elapsed = ?duration,
      "package installed"
    );

    Ok(PackageOutcome {
      name: package.name.clone(),
      version: package.version.clone(),
      reused_sources,
      files_installed: record.files.len(),
      duration,
    })
  }

  /// Bring every source of `package` to the patched state.
  ///
  /// Returns the build directory (the first source's tree, or the work directory
  /// for packages without sources) and whether every tree was reused as-is.
  async fn materialize(&self, package: &Package) -> Result<(PathBuf, bool), PipelineError> {
    let mut handles: Vec<SourceHandle> = package
      .sources
      .iter()
      .map(|spec| SourceHandle::new(spec.clone(), &self.downloads_dir, &self.work_dir))
      .collect();

    let mut pending = Vec::new();
    for (index, handle) in handles.iter_mut().enumerate() {
      if !handle.adopt_existing(&package.keys, patches_for(package, index)).await {
        pending.push(index);
      }
    }
    let reused = !handles.is_empty() && pending.is_empty();

    if !pending.is_empty() {
      debug!(package = %package.name, stage = %PackageStage::Downloading, "stage");
      // Fetch everything, signatures included, before verifying anything.
      for &index in &pending {
        handles[index]
          .download(&self.client)
          .await
          .map_err(failed(package, PackageStage::Downloading))?;
      }

      for &index in &pending {
        debug!(package = %package.name, stage = %PackageStage::Verifying, "stage");
        handles[index]
          .verify(&package.keys, &self.runner, &self.env)
          .await
          .map_err(failed(package, PackageStage::Verifying))?;

        debug!(package = %package.name, stage = %PackageStage::Extracting, "stage");
        handles[index]
          .extract()
          .await
          .map_err(failed(package, PackageStage::Extracting))?;
      }

      for &index in &pending {
        let patches = patches_for(package, index);
        if !patches.is_empty() {
          debug!(package = %package.name, stage = %PackageStage::Patching, "stage");
        }
        handles[index]
          .apply_patches(patches, &self.runner, &self.env)
          .await
          .map_err(failed(package, PackageStage::Patching))?;
      }
    }

    let tree = match handles.first() {
      Some(handle) => handle.tree().to_path_buf(),
      None => {
        tokio::fs::create_dir_all(&self.work_dir)
          .await
          .map_err(|source| crate::source::SourceError::Io {
            path: self.work_dir.clone(),
            source,
          })
          .map_err(failed(package, PackageStage::Extracting))?;
        self.work_dir.clone()
      }
    };

    Ok((tree, reused))
  }

  async fn run_steps(&self, package: &Package, tree: &Path) -> Result<(), BuildError> {
    let ctx = RecipeContext {
      arch: self.arch,
      api_level: self.api_level,
      ndk: &self.ndk,
      env: &self.env,
      sysroot: &self.sysroot,
      tools_dir: &self.tools_dir,
    };

    for step in package.steps(&ctx) {
      let label = step.label();
      match step {
        BuildStep::Cmd { program, args, env } => {
          let env = self.env.overlay(&env);
          let command = ToolCommand::new(program).args(args);
          info!(package = %package.name, "{}", command);

          let output = self.runner.run(&command, tree, &env).await?;
          if !output.success() {
            return Err(BuildError::StepFailed {
              package: package.name.clone(),
              step: label,
              code: output.code,
            });
          }
        }
        BuildStep::Copy { from, to } => {
          self.sysroot.copy_in(&from, &to)?;
        }
      }
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::package::PackageKind;
  use crate::util::testutil::RecordingRunner;
  use std::sync::Arc;
  use tempfile::TempDir;
  use tracing_test::traced_test;

  struct Fixture {
    _temp: TempDir,
    config: BuildConfig,
  }

  fn fixture() -> Fixture {
    let temp = TempDir::new().unwrap();
    let config = BuildConfig::new(TargetArch::Arm64, ApiLevel::new(21).unwrap(), temp.path().join("ndk"))
      .with_out_dir(temp.path().join("out"))
      .with_cache_dir(temp.path().join("cache"))
      .with_tools_dir(temp.path().join("tools"));
    Fixture { _temp: temp, config }
  }

  fn pipeline(config: &BuildConfig, runner: RecordingRunner) -> BuildPipeline<RecordingRunner> {
    let ndk = Ndk::from_parts(config.ndk_root.clone(), "linux-x86_64".to_string());
    let sysroot = Sysroot::new(config.sysroot_dir()).unwrap();
    let env = crate::toolchain::derive(config.arch.profile(), config.api_level, &ndk, &sysroot);
    BuildPipeline::new(config, ndk, env, sysroot, runner, reqwest::Client::new())
  }

  fn script(name: &str, steps: Vec<BuildStep>) -> Package {
    Package::new(name, "1.0", PackageKind::Script(steps))
  }

  /// A runner whose `install <file>` steps create `<sysroot>/<file>`.
  fn installing_runner(sysroot: PathBuf) -> RecordingRunner {
    RecordingRunner::new().on_run(move |inv| {
      if inv.command.program == "install" {
        let dest = sysroot.join(&inv.command.args[0]);
        std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
        std::fs::write(dest, "").unwrap();
      }
    })
  }

  #[tokio::test]
  async fn builds_in_order_and_stops_at_first_failure() {
    let f = fixture();
    let runner = installing_runner(f.config.sysroot_dir()).fail_when(|inv| inv.command.args.first().map(String::as_str) == Some("b-fails"));
    let p = pipeline(&f.config, runner);

    let packages = vec![
      script("a", vec![BuildStep::cmd("install", ["usr/lib/liba.a"])]),
      script("b", vec![BuildStep::cmd("install", ["usr/lib/libb.a"]), BuildStep::cmd("make", ["b-fails"])]),
      script("c", vec![BuildStep::cmd("install", ["usr/lib/libc.a"])]),
    ];

    let err = p.run(&packages).await.unwrap_err();
    assert_eq!(err.package(), Some("b"));
    assert_eq!(err.stage(), Some(PackageStage::Building));
    assert!(matches!(
      err,
      PipelineError::Package {
        source: StageError::Build(BuildError::StepFailed { code: Some(1), .. }),
        ..
      }
    ));

    let lines: Vec<_> = p.runner().calls().iter().map(|c| c.line()).collect();
    assert_eq!(lines, vec!["install usr/lib/liba.a", "install usr/lib/libb.a", "make b-fails"]);

    let sysroot = p.sysroot();
    assert!(sysroot.lib_dir().join("liba.a").exists());
    assert!(sysroot.lib_dir().join("libb.a").exists(), "partial installs are kept");
    assert!(!sysroot.lib_dir().join("libc.a").exists());

    let recorded: Vec<_> = sysroot.installed().unwrap().into_iter().map(|r| r.package).collect();
    assert_eq!(recorded, vec!["a"]);
  }

  #[tokio::test]
  async fn step_overlays_never_leak_into_later_packages() {
    let f = fixture();
    let p = pipeline(&f.config, RecordingRunner::new());
    let base = p.env().clone();

    let packages = vec![
      script(
        "first",
        vec![
          BuildStep::cmd("make", Vec::<String>::new())
            .env("CHOST", "aarch64-linux-android-")
            .env("CFLAGS", "-O0 -fPIC"),
        ],
      ),
      script("second", vec![BuildStep::cmd("make", Vec::<String>::new())]),
    ];
    p.run(&packages).await.unwrap();

    let calls = p.runner().calls();
    assert_eq!(calls[0].env.get("CHOST"), Some("aarch64-linux-android-"));
    assert_eq!(calls[0].env.get("CFLAGS"), Some("-O0 -fPIC"));
    assert_eq!(calls[1].env, base);
    assert_eq!(p.env(), &base);
  }

  #[tokio::test]
  async fn records_installed_files_per_package() {
    let f = fixture();
    let p = pipeline(&f.config, installing_runner(f.config.sysroot_dir()));

    let packages = vec![
      script("zlib", vec![BuildStep::cmd("install", ["usr/lib/libz.a"]), BuildStep::cmd("install", ["usr/include/zlib.h"])]),
      script("xz", vec![BuildStep::cmd("install", ["usr/lib/liblzma.a"])]),
    ];
    let report = p.run(&packages).await.unwrap();

    assert_eq!(report.packages.len(), 2);
    assert_eq!(report.packages[0].files_installed, 2);
    assert_eq!(report.files_installed(), 3);
    assert!(!report.packages[0].reused_sources);

    let records = p.sysroot().installed().unwrap();
    assert_eq!(
      records[0].files,
      vec![PathBuf::from("usr/include/zlib.h"), PathBuf::from("usr/lib/libz.a")]
    );
    assert_eq!(records[1].files, vec![PathBuf::from("usr/lib/liblzma.a")]);
  }

  #[tokio::test]
  async fn rebuilding_into_an_existing_sysroot_keeps_install_records() {
    let f = fixture();
    let zlib = script("zlib", vec![BuildStep::cmd("install", ["usr/lib/libz.a"])]);

    let first = pipeline(&f.config, installing_runner(f.config.sysroot_dir()));
    first.run(std::slice::from_ref(&zlib)).await.unwrap();

    // Same files, unchanged content: nothing new appears in the listing.
    let second = pipeline(&f.config, installing_runner(f.config.sysroot_dir()));
    let report = second.run(&[zlib]).await.unwrap();

    assert_eq!(report.packages[0].files_installed, 1);
    let record = second.sysroot().record_for("zlib").unwrap().unwrap();
    assert_eq!(record.files, vec![PathBuf::from("usr/lib/libz.a")]);
  }

  #[tokio::test]
  async fn rewritten_files_count_as_installed() {
    let f = fixture();
    let sysroot = Sysroot::new(f.config.sysroot_dir()).unwrap();
    sysroot.prepare().unwrap();
    std::fs::write(sysroot.lib_dir().join("libffi.a"), "old").unwrap();

    let lib = sysroot.lib_dir().join("libffi.a");
    let runner = RecordingRunner::new().on_run(move |_| std::fs::write(&lib, "rebuilt archive").unwrap());
    let p = pipeline(&f.config, runner);
    p.run(&[script("libffi", vec![BuildStep::cmd("make", ["install"])])])
      .await
      .unwrap();

    let record = p.sysroot().record_for("libffi").unwrap().unwrap();
    assert_eq!(record.files, vec![PathBuf::from("usr/lib/libffi.a")]);
  }

  #[tokio::test]
  async fn unwritable_install_record_fails_while_building() {
    let f = fixture();
    let sysroot = Sysroot::new(f.config.sysroot_dir()).unwrap();
    sysroot.prepare().unwrap();
    std::fs::write(sysroot.root().join(crate::consts::SYSROOT_META_DIR), "not a directory").unwrap();

    let p = pipeline(&f.config, RecordingRunner::new());
    let err = p
      .run(&[script("sqlite", vec![BuildStep::cmd("make", Vec::<String>::new())])])
      .await
      .unwrap_err();
    assert_eq!(err.stage(), Some(PackageStage::Building));
  }

  #[tokio::test]
  async fn copy_steps_place_files_in_the_sysroot() {
    let f = fixture();
    std::fs::create_dir_all(&f.config.tools_dir).unwrap();
    for name in crate::package::recipes::TOOL_SCRIPTS {
      std::fs::write(f.config.tools_dir.join(name), format!("# {}\n", name)).unwrap();
    }

    let p = pipeline(&f.config, RecordingRunner::new());
    p.run(&[Package::new("tools", "0", PackageKind::Tools)]).await.unwrap();

    assert_eq!(
      std::fs::read_to_string(p.sysroot().tools_dir().join("env.sh")).unwrap(),
      "# env.sh\n"
    );
    assert!(p.runner().calls().is_empty());
  }

  #[tokio::test]
  async fn missing_tool_script_fails_the_package() {
    let f = fixture();
    let p = pipeline(&f.config, RecordingRunner::new());
    let err = p.run(&[Package::new("tools", "0", PackageKind::Tools)]).await.unwrap_err();
    assert!(matches!(
      err,
      PipelineError::Package {
        stage: PackageStage::Building,
        source: StageError::Build(BuildError::Sysroot(_)),
        ..
      }
    ));
  }

  #[tokio::test]
  async fn verification_failure_stops_before_building() {
    let f = fixture();
    let downloads = f.config.downloads_dir();
    std::fs::create_dir_all(&downloads).unwrap();

    let spec = crate::source::SourceSpec::url("https://example.invalid/ncurses-6.1.tar.gz").signed(".asc");
    std::fs::write(downloads.join("ncurses-6.1.tar.gz"), "archive").unwrap();
    std::fs::write(downloads.join("ncurses-6.1.tar.gz.asc"), "sig").unwrap();

    // gpg "succeeds" but reports no VALIDSIG line.
    let p = pipeline(&f.config, RecordingRunner::new());
    let package = Package::new("ncurses", "6.1", PackageKind::Ncurses)
      .source(spec)
      .key("C52048C0C0748FEE227D47A2702353E0F7E48EDB");

    let err = p.run(&[package]).await.unwrap_err();
    assert_eq!(err.stage(), Some(PackageStage::Verifying));
    let programs: Vec<_> = p.runner().calls().into_iter().map(|c| c.command.program).collect();
    assert_eq!(programs, vec!["gpg"]);
  }

  #[tokio::test]
  async fn materialized_sources_are_reused_on_the_next_run() {
    let f = fixture();
    let downloads = f.config.downloads_dir();
    std::fs::create_dir_all(&downloads).unwrap();

    let spec = crate::source::SourceSpec::cpython_deps("zlib");
    crate::source::extract::tests::write_tar_gz(
      &downloads.join(spec.archive_name()),
      "cpython-source-deps-zlib",
      &[("configure", "#!/bin/sh\n")],
    );
    let package = script("zlib", vec![BuildStep::cmd("make", ["libz.a"])]).source(spec);

    let first = pipeline(&f.config, RecordingRunner::new());
    let report = first.run(std::slice::from_ref(&package)).await.unwrap();
    assert!(!report.packages[0].reused_sources);
    assert_eq!(first.runner().calls()[0].cwd, f.config.work_dir().join("zlib"));

    let second = pipeline(&f.config, RecordingRunner::new());
    let report = second.run(&[package]).await.unwrap();
    assert!(report.packages[0].reused_sources);
  }

  #[tokio::test]
  async fn fetch_downloads_without_building() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("GET", "/sqlite.tar.gz")
      .with_status(200)
      .with_body("bytes")
      .expect(1)
      .create_async()
      .await;

    let f = fixture();
    let p = pipeline(&f.config, RecordingRunner::new());
    let package = script("sqlite", vec![BuildStep::cmd("make", Vec::<String>::new())])
      .source(crate::source::SourceSpec::url(format!("{}/sqlite.tar.gz", server.url())));

    assert_eq!(p.fetch(&[package]).await.unwrap(), 1);
    mock.assert_async().await;
    assert!(f.config.downloads_dir().join("sqlite.tar.gz").exists());
    assert!(p.runner().calls().is_empty());
  }

  #[tokio::test]
  #[traced_test]
  async fn logs_package_progress() {
    let f = fixture();
    let seen = Arc::new(std::sync::Mutex::new(0));
    let counter = seen.clone();
    let runner = RecordingRunner::new().on_run(move |_| {
      if let Ok(mut n) = counter.lock() {
        *n += 1;
      }
    });
    let p = pipeline(&f.config, runner);

    p.run(&[script("bzip2", vec![BuildStep::cmd("make", Vec::<String>::new())])])
      .await
      .unwrap();

    assert_eq!(*seen.lock().unwrap(), 1);
    assert!(logs_contain("building package"));
    assert!(logs_contain("package installed"));
    assert!(logs_contain("pipeline complete"));
  }
}
