//! Implementation of the `droidforge fetch` command.

use std::path::PathBuf;

use anyhow::{Context, Result};

use droidforge_lib::config::downloads_dir;
use droidforge_lib::package::{registry, select};
use droidforge_lib::pipeline::fetch_sources;
use droidforge_lib::source::fetch::http_client;
use droidforge_lib::platform::paths;

use crate::output::{print_info, print_success};

use super::runtime;

/// Download sources for the selected packages; no NDK or target needed.
pub fn cmd_fetch(cache: Option<PathBuf>, only: &[String]) -> Result<()> {
  let packages = select(registry(), only)?;
  let dir = downloads_dir(&cache.unwrap_or_else(paths::cache_dir));

  print_info(&format!("Fetching sources into {}", dir.display()));

  let rt = runtime()?;
  let client = http_client()?;
  let count = rt
    .block_on(fetch_sources(&client, &packages, &dir))
    .context("Fetch failed")?;

  print_success(&format!("{} archive(s) cached", count));
  Ok(())
}
