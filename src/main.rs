//! Binary entry point: read configuration, open the database once, run a
//! single command and close the database again.
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use library_circulation::cli::{execute, Cli};
use library_circulation::{Config, Library, LibraryError};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<LibraryError>() {
                Some(library_err) => eprintln!("error[{}]: {library_err}", library_err.kind()),
                None => eprintln!("error: {err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

/// Resolve configuration, open the library and execute the command. Fatal
/// setup problems (unreadable home directory, bad environment values) bubble
/// up with context instead of panicking.
fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::from_env().context("failed to load configuration")?;
    if let Some(path) = cli.db {
        config.database_path = path;
    }

    let library = Library::open(config)?;
    let outcome = execute(&library, cli.command);
    library.close()?;
    outcome
}
