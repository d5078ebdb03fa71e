//! Tracing setup for the server.
//!
//! Development builds log human-readable output to stdout, including
//! radio-call spans and HTTP request traces. Production builds write JSON
//! to a daily log file and keep a plain copy on stdout for the journal.

use std::path::PathBuf;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directives used when neither `RUST_LOG` nor `BEACON_LOG_LEVEL` is set.
pub const DEFAULT_FILTER: &str = "info,tower_http=debug";

/// Environment variable holding the filter when `RUST_LOG` is unset.
pub const LOG_LEVEL_ENV: &str = "BEACON_LOG_LEVEL";

/// Environment variable overriding the production log directory.
pub const LOG_DIR_ENV: &str = "BEACON_LOG_DIR";

const LOG_FILE_PREFIX: &str = "beacon";

/// Keeps the non-blocking writers flushing. Hold it until shutdown.
#[must_use = "dropping the guard stops log output"]
pub struct LoggingGuard {
    _writers: Vec<WorkerGuard>,
}

/// Install the global subscriber.
///
/// # Errors
///
/// Returns an error if the filter does not parse or the production log
/// directory cannot be created.
pub fn init(production: bool) -> anyhow::Result<LoggingGuard> {
    let filter = env_filter()?;
    if production {
        init_production(filter)
    } else {
        init_development(filter);
        Ok(LoggingGuard {
            _writers: Vec::new(),
        })
    }
}

fn env_filter() -> anyhow::Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let directives = std::env::var(LOG_LEVEL_ENV).unwrap_or_else(|_| DEFAULT_FILTER.to_string());
    EnvFilter::try_new(&directives).with_context(|| format!("invalid {LOG_LEVEL_ENV}: {directives}"))
}

fn init_production(filter: EnvFilter) -> anyhow::Result<LoggingGuard> {
    let dir = log_directory();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("creating log directory {}", dir.display()))?;

    let (file_writer, file_guard) =
        tracing_appender::non_blocking(RollingFileAppender::new(Rotation::DAILY, &dir, LOG_FILE_PREFIX));
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_writer(file_writer),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_ansi(false)
                .with_writer(stdout_writer),
        )
        .init();

    tracing::debug!(dir = %dir.display(), "File logging enabled");
    Ok(LoggingGuard {
        _writers: vec![file_guard, stdout_guard],
    })
}

fn init_development(filter: EnvFilter) {
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .pretty()
                .with_file(true)
                .with_line_number(true)
                .with_span_events(FmtSpan::CLOSE),
        )
        .init();
}

/// `BEACON_LOG_DIR`, else the system log directory on Linux, else the
/// per-user data directory.
fn log_directory() -> PathBuf {
    if let Some(dir) = std::env::var_os(LOG_DIR_ENV) {
        return PathBuf::from(dir);
    }
    if cfg!(target_os = "linux") {
        return PathBuf::from("/var/log/beacon");
    }
    directories::ProjectDirs::from("", "", "beacon")
        .map_or_else(|| PathBuf::from("./logs"), |dirs| dirs.data_dir().join("logs"))
}
