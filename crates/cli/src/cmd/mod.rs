mod build;
mod env;
mod exec;
mod fetch;
mod list;

pub use build::{BuildArgs, cmd_build};
pub use env::cmd_env;
pub use exec::cmd_exec;
pub use fetch::cmd_fetch;
pub use list::cmd_list;

use anyhow::{Context, Result};

use droidforge_lib::config::{BuildConfig, ndk_root_from_env};

use crate::Target;

/// Configuration for `target`, with the NDK root taken from `$ANDROID_NDK`.
fn target_config(target: &Target) -> Result<BuildConfig> {
  let ndk_root = ndk_root_from_env().context("Android NDK not configured")?;
  Ok(BuildConfig::new(target.arch, target.api, ndk_root))
}

fn runtime() -> Result<tokio::runtime::Runtime> {
  tokio::runtime::Runtime::new().context("Failed to create async runtime")
}
