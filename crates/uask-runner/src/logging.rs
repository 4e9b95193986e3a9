//! Console and rolling-file logging for the binaries.

use crate::{Error, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log files kept in the logs directory.
pub const MAX_LOG_FILES: usize = 5;

const FILE_PREFIX: &str = "test_execution";

/// Everything from our crates goes to the file, whatever the console shows.
const FILE_FILTER: &str = "info,uask_agent=debug,uask_runner=debug,uask_validators=debug";

/// Console filter from the CLI flags, falling back to `LOG_LEVEL`.
///
/// `-q` wins over `-v`. Long level names (`WARNING`, `CRITICAL`)
/// are accepted.
pub fn console_directive(quiet: bool, verbose: u8, log_level: &str) -> String {
    if quiet {
        return "error".into();
    }
    match verbose {
        0 => level_name(log_level).into(),
        1 => "info".into(),
        2 => "debug".into(),
        _ => "trace".into(),
    }
}

fn level_name(raw: &str) -> &'static str {
    match raw.trim().to_ascii_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" | "warning" => "warn",
        "error" | "critical" | "fatal" => "error",
        "off" => "off",
        _ => "info",
    }
}

/// Install the global subscriber: compact console output plus a daily
/// rolling file under `logs_dir`. `RUST_LOG` overrides the console filter.
///
/// Keep the returned guard alive until exit or buffered lines are lost.
pub fn init(logs_dir: &Path, console: &str) -> Result<WorkerGuard> {
    std::fs::create_dir_all(logs_dir)?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(FILE_PREFIX)
        .filename_suffix("log")
        .max_log_files(MAX_LOG_FILES)
        .build(logs_dir)
        .map_err(|e| Error::Config(format!("log file in {}: {}", logs_dir.display(), e)))?;
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(console));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_ansi(false)
                .with_writer(non_blocking)
                .with_filter(EnvFilter::new(FILE_FILTER)),
        )
        .with(
            fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact()
                .with_filter(console_filter),
        )
        .try_init()
        .map_err(|e| Error::Config(format!("failed to initialize logging: {}", e)))?;

    Ok(guard)
}
