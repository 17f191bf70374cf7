pub mod config;

pub use config::{ConsoleOutput, LogFormat, LoggingConfig};

use crate::Result;
use anyhow::{anyhow, Context};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::prelude::*;

static LOGGER_INITIALIZED: AtomicBool = AtomicBool::new(false);

fn make_writer(output: ConsoleOutput) -> BoxMakeWriter {
    match output {
        ConsoleOutput::Stdout => BoxMakeWriter::new(io::stdout),
        ConsoleOutput::Stderr => BoxMakeWriter::new(io::stderr),
        ConsoleOutput::None => BoxMakeWriter::new(io::sink),
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `default_level`. Errors when invoked more
/// than once per process unless tests reset the guard.
pub fn init(config: &LoggingConfig) -> Result<()> {
    config.validate()?;
    if LOGGER_INITIALIZED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Err(anyhow!("logging already initialized"));
    }

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.default_level))
        .context("failed to configure tracing level")?;

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(make_writer(config.console_output))
        .with_ansi(false)
        .with_target(false);

    let registry = tracing_subscriber::registry().with(env_filter);
    let installed = match config.format {
        LogFormat::Text => registry.with(layer).try_init(),
        LogFormat::Json => registry.with(layer.json()).try_init(),
    };
    installed.context("failed to install tracing subscriber")?;
    Ok(())
}

#[cfg(test)]
/// Reset the initialization guard so tests can reconfigure logging multiple times.
pub fn reset_for_tests() {
    LOGGER_INITIALIZED.store(false, Ordering::SeqCst);
}
