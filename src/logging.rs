use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Prefix of the daily log files
pub const LOG_PREFIX: &str = "android-analyzer";

/// How the process should log
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    /// Use debug level unless `RUST_LOG` says otherwise
    pub verbose: bool,
    /// Emit console output as JSON lines
    pub json: bool,
    /// Also write daily-rotated log files into this directory
    pub log_dir: Option<Utf8PathBuf>,
}

/// Level used when `RUST_LOG` is not set
pub fn default_level(verbose: bool) -> &'static str {
    if verbose { "debug" } else { "info" }
}

fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level(verbose)))
}

fn create_log_dir(log_dir: &Utf8Path) -> Result<()> {
    if !log_dir.exists() {
        fs::create_dir_all(log_dir)
            .with_context(|| format!("Failed to create log directory: {}", log_dir))?;
    }
    Ok(())
}

/// Setup logging to stderr with an optional rotating file appender.
///
/// Console output goes to stderr so that commands printing results on stdout
/// stay pipeable.
///
/// # Returns
/// The file writer's guard when a log directory was given. It must be held for
/// the duration of the program to keep file logging active.
pub fn init(options: &LogOptions) -> Result<Option<WorkerGuard>> {
    let (file_layer, guard) = match &options.log_dir {
        Some(log_dir) => {
            create_log_dir(log_dir)?;

            let file_appender = rolling::daily(log_dir, LOG_PREFIX);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false) // No ANSI codes in log files
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true);

            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let (plain_layer, json_layer) = if options.json {
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr);
        (None, Some(layer))
    } else {
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false);
        (Some(layer), None)
    };

    tracing_subscriber::registry()
        .with(env_filter(options.verbose))
        .with(file_layer)
        .with(plain_layer)
        .with(json_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    tracing::debug!(
        "Logging initialized: verbose={}, json={}, log_dir={:?}",
        options.verbose,
        options.json,
        options.log_dir
    );

    Ok(guard)
}
