//! wsmemo - memoized command runs over workspace snapshots
//!
//! wsmemo provides:
//! - Workspace snapshots through git or a native content-addressed store
//! - A persisted cache of (command, input snapshot) -> (output snapshot, output)
//! - Direct and cluster-submission command execution
//! - Unified output format (jsonl/json/md/raw)

use anyhow::Result;
use clap::Parser;

mod backends;
mod cache;
mod cli;
mod core;
mod flows;
mod snapshot;

fn main() -> Result<()> {
    // Check for unsupported platforms
    #[cfg(windows)]
    {
        eprintln!("Error: Windows is not supported. Commands are run through sh.");
        std::process::exit(1);
    }

    let cli = cli::Cli::parse();
    core::logging::init(cli.quiet, cli.verbose);
    cli::run(cli)
}
