use crate::error::{CliError, Result};
use std::fs::File;
use std::path::Path;
use tracing_subscriber::{
    filter::{LevelFilter, Targets},
    fmt::{self},
    prelude::*,
};

/// Target prefix shared by the library and the binary.
const CRATE_TARGET: &str = "apollox";

pub fn level_for(verbosity: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::OFF;
    }
    match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Events from this crate follow `level`; dependencies stay at WARN unless
/// the whole output is silenced.
fn filter_for(level: LevelFilter) -> Targets {
    Targets::new()
        .with_target(CRATE_TARGET, level)
        .with_default(level.min(LevelFilter::WARN))
}

pub fn setup_logging(verbosity: u8, quiet: bool, log_file: Option<&Path>) -> Result<()> {
    let level = level_for(verbosity, quiet);

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(false)
        .compact();

    let subscriber = tracing_subscriber::registry()
        .with(filter_for(level))
        .with(stderr_layer);

    if let Some(path) = log_file {
        let file = File::create(path).map_err(CliError::Io)?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_target(true);

        subscriber.with(file_layer).init();
    } else {
        subscriber.init();
    }

    Ok(())
}
