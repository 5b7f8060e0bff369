//! Logging initialization for esys-driver.
//!
//! With `logging.to_file`: logs to `<logdir>/esys-driver-{datetime}.log`
//! Otherwise: logs to stderr
//!
//! The launcher's own output goes to `EsysLog.log` and is not routed
//! through here.

use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Settings;

/// Result of logging initialization
pub struct LoggingHandle {
    /// Guard that must be kept alive for the duration of the program.
    /// When dropped, ensures all buffered logs are flushed.
    pub _guard: Option<WorkerGuard>,

    /// Path to the log file (only set with file logging enabled)
    pub log_file_path: Option<PathBuf>,
}

/// Log file name for a run started now
pub fn log_file_name() -> String {
    let timestamp = chrono::Utc::now().format("%Y%m%dT%H%M%SZ");
    format!("esys-driver-{}.log", timestamp)
}

/// Filter directive: `RUST_LOG` wins, then `--debug`, then the configured level
fn filter_directive(
    settings: &Settings,
    debug_override: bool,
    rust_log: Option<String>,
) -> String {
    match rust_log {
        Some(directive) if !directive.trim().is_empty() => directive,
        _ if debug_override => "debug".to_string(),
        _ => settings.logging.level.clone(),
    }
}

/// Directory driver logs go to, if file logging applies
fn file_log_dir<'a>(settings: &Settings, log_dir: Option<&'a Path>) -> Option<&'a Path> {
    log_dir.filter(|_| settings.logging.to_file)
}

/// Initialize logging.
///
/// # Arguments
/// * `settings` - Application settings
/// * `log_dir` - Device log directory, used when `logging.to_file` is set
/// * `debug_override` - Force the "debug" level (from --debug)
///
/// # Returns
/// A `LoggingHandle` that must be kept alive for the duration of the program.
pub fn init_logging(
    settings: &Settings,
    log_dir: Option<&Path>,
    debug_override: bool,
) -> Result<LoggingHandle> {
    let filter = EnvFilter::new(filter_directive(
        settings,
        debug_override,
        std::env::var("RUST_LOG").ok(),
    ));

    let Some(logs_dir) = file_log_dir(settings, log_dir) else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();
        return Ok(LoggingHandle {
            _guard: None,
            log_file_path: None,
        });
    };

    std::fs::create_dir_all(logs_dir)?;
    let log_filename = log_file_name();
    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(logs_dir, &log_filename));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer),
        )
        .init();

    Ok(LoggingHandle {
        _guard: Some(guard),
        log_file_path: Some(logs_dir.join(log_filename)),
    })
}
