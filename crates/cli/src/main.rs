use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use droidforge_lib::config::ApiLevel;
use droidforge_lib::platform::TargetArch;

mod cmd;
mod output;

use cmd::{BuildArgs, cmd_build, cmd_env, cmd_exec, cmd_fetch, cmd_list};

/// droidforge - cross-compiles native libraries into an Android NDK sysroot
#[derive(Parser)]
#[command(name = "droidforge")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

/// Selects the (architecture, API level) pair to build for.
#[derive(Args, Debug, Clone)]
pub struct Target {
  /// Target architecture: arm, arm64, x86 or x86_64
  #[arg(short, long)]
  pub arch: TargetArch,

  /// Android API level, 21 to 29
  #[arg(long)]
  pub api: ApiLevel,
}

#[derive(Subcommand)]
enum Commands {
  /// Build every package into the target's sysroot
  Build {
    #[command(flatten)]
    target: Target,

    /// Build output root (default: $DROIDFORGE_OUT or ./build)
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Download cache (default: $DROIDFORGE_CACHE or the user cache directory)
    #[arg(long)]
    cache: Option<PathBuf>,

    /// Directory holding the auxiliary scripts copied into <sysroot>/tools
    #[arg(long)]
    tools_dir: Option<PathBuf>,

    /// Build only these packages, in registry order (repeatable)
    #[arg(long = "only", value_name = "PACKAGE")]
    only: Vec<String>,
  },

  /// Print the derived toolchain environment as shell exports
  Env {
    #[command(flatten)]
    target: Target,
  },

  /// Run a command under the derived toolchain environment
  Exec {
    #[command(flatten)]
    target: Target,

    /// Command and arguments, after `--`
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true, value_name = "COMMAND")]
    command: Vec<String>,
  },

  /// Download package sources into the cache without building
  Fetch {
    /// Download cache (default: $DROIDFORGE_CACHE or the user cache directory)
    #[arg(long)]
    cache: Option<PathBuf>,

    /// Fetch only these packages (repeatable)
    #[arg(long = "only", value_name = "PACKAGE")]
    only: Vec<String>,
  },

  /// List the registered packages in build order
  List,
}

fn main() {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "info" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let result = match cli.command {
    Commands::Build {
      target,
      out,
      cache,
      tools_dir,
      only,
    } => cmd_build(BuildArgs {
      target,
      out,
      cache,
      tools_dir,
      only,
    }),
    Commands::Env { target } => cmd_env(&target),
    Commands::Exec { target, command } => cmd_exec(&target, &command),
    Commands::Fetch { cache, only } => cmd_fetch(cache, &only),
    Commands::List => cmd_list(cli.verbose),
  };

  if let Err(err) = result {
    output::print_error(&format!("{:#}", err));
    std::process::exit(1);
  }
}
