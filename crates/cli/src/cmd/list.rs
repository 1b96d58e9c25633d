//! Implementation of the `droidforge list` command.

use anyhow::Result;
use owo_colors::{OwoColorize, Stream};

use droidforge_lib::package::registry;

use crate::output::symbols;

/// Print registered packages in build order.
pub fn cmd_list(verbose: bool) -> Result<()> {
  for (index, package) in registry().iter().enumerate() {
    let deps = if package.depends_on.is_empty() {
      String::new()
    } else {
      format!(" {} {}", symbols::ARROW, package.depends_on.join(", "))
    };
    println!(
      "{:>2}. {} {}{}",
      index + 1,
      package.name.if_supports_color(Stream::Stdout, |s| s.bold()),
      package.version.if_supports_color(Stream::Stdout, |s| s.dimmed()),
      deps
    );

    if verbose {
      for source in &package.sources {
        println!("      {}", source);
      }
      if !package.keys.is_empty() {
        println!("      keys: {}", package.keys.join(", "));
      }
    }
  }
  Ok(())
}
