//! Implementation of the `droidforge env` command.

use anyhow::{Context, Result};

use droidforge_lib::pipeline::BuildPipeline;
use droidforge_lib::runner::ProcessRunner;

use crate::Target;

use super::target_config;

/// Print the derived environment as `export` lines, suitable for `eval`.
pub fn cmd_env(target: &Target) -> Result<()> {
  let config = target_config(target)?;
  let pipeline = BuildPipeline::from_config(&config, ProcessRunner).context("Toolchain setup failed")?;
  print!("{}", pipeline.env().to_shell_exports());
  Ok(())
}
