//! Stepfetch CLI - resumable chunked downloads from the command line.
//!
//! The binary plays the role of the external caller the library is written
//! for: it runs one step at a time, persists the returned job state to a
//! JSON file after every step, and resubmits it until the download is done.
//! Killing the process at any point leaves a state file behind that a later
//! invocation resumes from.

mod commands;
mod error;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::error::CliError;

#[derive(Debug, Parser)]
#[command(name = "stepfetch", version, about = "Resumable chunked HTTP downloads")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Download a file in resumable, time-boxed steps
    Fetch(commands::fetch::FetchArgs),
    /// Resolve redirects and probe a URL for size and range support
    Probe(commands::probe::ProbeArgs),
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let result: Result<(), CliError> = match cli.command {
        Command::Fetch(args) => commands::fetch::run(args),
        Command::Probe(args) => commands::probe::run(args),
    };

    if let Err(e) = result {
        eprintln!("{} {}", console::style("error:").red().bold(), e);
        std::process::exit(1);
    }
}
