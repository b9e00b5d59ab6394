//! Tracing subscriber setup.

use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// `RUST_LOG` wins; otherwise `debug` when verbose and `warn` by default.
fn filter(verbose: bool) -> EnvFilter {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}

/// Log to stderr for non-interactive commands.
pub fn init_stderr(verbose: bool) {
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter(verbose))
        .try_init();
}

/// Log to `<data dir>/ghbundle/ghbundle.log` so the terminal UI is not overwritten.
/// Returns the log file path.
pub fn init_file(verbose: bool) -> Result<PathBuf> {
    let dir = dirs_next::data_dir()
        .ok_or_else(|| anyhow!("unable to determine the user data directory"))?
        .join(env!("CARGO_PKG_NAME"));
    fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create log directory {}", dir.display()))?;
    let path = dir.join(concat!(env!("CARGO_PKG_NAME"), ".log"));
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;

    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .with(filter(verbose))
        .try_init();
    Ok(path)
}
