//! Implementation of the `droidforge build` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use owo_colors::{OwoColorize, Stream};

use droidforge_lib::package::{PackageKind, registry, select, validate_order};
use droidforge_lib::pipeline::BuildPipeline;
use droidforge_lib::runner::ProcessRunner;

use crate::Target;
use crate::output::{format_duration, print_info, print_stat, print_success, symbols};

use super::{runtime, target_config};

pub struct BuildArgs {
  pub target: Target,
  pub out: Option<PathBuf>,
  pub cache: Option<PathBuf>,
  pub tools_dir: Option<PathBuf>,
  pub only: Vec<String>,
}

/// Execute the build command.
///
/// Validates the package order, locates the NDK and runs the pipeline. The first
/// failing package aborts the run; the sysroot keeps whatever was installed.
pub fn cmd_build(args: BuildArgs) -> Result<()> {
  let mut config = target_config(&args.target)?;
  if let Some(out) = args.out {
    config = config.with_out_dir(out);
  }
  if let Some(cache) = args.cache {
    config = config.with_cache_dir(cache);
  }
  if let Some(tools_dir) = args.tools_dir {
    config = config.with_tools_dir(tools_dir);
  }

  let packages = registry();
  validate_order(&packages).context("Invalid package order")?;
  let packages = select(packages, &args.only)?;
  if packages.iter().any(|p| p.kind == PackageKind::Tools) {
    config.check_tool_scripts()?;
  }

  let pipeline = BuildPipeline::from_config(&config, ProcessRunner).context("Toolchain setup failed")?;

  print_info(&format!(
    "Building {} package(s) for {}-android{} into {}",
    packages.len(),
    config.arch,
    config.api_level,
    pipeline.sysroot().root().display()
  ));

  let rt = runtime()?;
  let report = rt.block_on(pipeline.run(&packages)).context("Build failed")?;

  println!();
  for outcome in &report.packages {
    let note = if outcome.reused_sources { " (cached source)" } else { "" };
    println!(
      "  {} {} {} {}{}",
      symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
      outcome.name,
      outcome.version.if_supports_color(Stream::Stdout, |s| s.dimmed()),
      format_duration(outcome.duration),
      note
    );
  }
  println!();
  print_success("Build complete!");
  print_stat("Packages", &report.packages.len().to_string());
  print_stat("Files installed", &report.files_installed().to_string());
  print_stat("Elapsed", &format_duration(report.total_duration()));

  Ok(())
}
