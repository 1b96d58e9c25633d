//! Implementation of the `droidforge exec` command.

use anyhow::{Context, Result, bail};
use tracing::debug;

use droidforge_lib::pipeline::BuildPipeline;
use droidforge_lib::runner::{ProcessRunner, ToolCommand, ToolRunner};

use crate::Target;

use super::{runtime, target_config};

/// Run one command under the derived environment and exit with its status.
pub fn cmd_exec(target: &Target, command: &[String]) -> Result<()> {
  let Some((program, args)) = command.split_first() else {
    bail!("no command given");
  };

  let config = target_config(target)?;
  let pipeline = BuildPipeline::from_config(&config, ProcessRunner).context("Toolchain setup failed")?;
  let cwd = std::env::current_dir().context("Failed to read current directory")?;

  let tool = ToolCommand::new(program.as_str()).args(args.iter().map(String::as_str));
  debug!(command = %tool, "exec");

  let rt = runtime()?;
  let output = rt.block_on(pipeline.runner().run(&tool, &cwd, pipeline.env()))?;

  match output.code {
    Some(0) => Ok(()),
    Some(code) => std::process::exit(code),
    None => bail!("'{}' was terminated by a signal", program),
  }
}
