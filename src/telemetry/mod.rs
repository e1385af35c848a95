//! Tracing subscriber setup
//!
//! The library itself only emits `tracing` events; installing a subscriber is
//! left to the embedding program. [`init_tracing`] is the one the bundled
//! server uses.
//!
//! ```rust,ignore
//! use llm_bridge::config::LoggingConfig;
//!
//! let _guard = llm_bridge::telemetry::init_tracing(&LoggingConfig::default())?;
//! ```

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use crate::config::{LogFormat, LoggingConfig};
use crate::error::LlmError;

const DEFAULT_LOG_FILE: &str = "llm-bridge.log";

/// Install the global subscriber described by `config`.
///
/// `RUST_LOG` takes precedence over `config.level`. When `config.file` is set
/// output goes to a daily rolling file instead of stdout, and the returned
/// guard must be kept alive for the lifetime of the program. An already
/// installed subscriber is left in place.
pub fn init_tracing(config: &LoggingConfig) -> Result<Option<WorkerGuard>, LlmError> {
    let filter = build_filter(&config.level)?;

    let (writer, guard, ansi) = match &config.file {
        Some(path) => {
            let (writer, guard) = rolling_writer(path)?;
            (writer, Some(guard), false)
        }
        None => (BoxMakeWriter::new(std::io::stdout), None, true),
    };

    let init_result = match config.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_target(true)
            .with_thread_ids(true)
            .json()
            .try_init(),
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_target(true)
            .with_ansi(ansi)
            .try_init(),
    };

    match init_result {
        Ok(()) => Ok(guard),
        Err(e) if is_already_installed(&e.to_string()) => {
            tracing::debug!("tracing subscriber already installed");
            Ok(None)
        }
        Err(e) => Err(LlmError::ConfigurationError(format!(
            "Failed to initialize tracing: {e}"
        ))),
    }
}

fn is_already_installed(message: &str) -> bool {
    message.contains("already been set") || message.contains("already initialized")
}

fn build_filter(level: &str) -> Result<EnvFilter, LlmError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(level)
        .map_err(|e| LlmError::ConfigurationError(format!("Invalid log level '{level}': {e}")))
}

fn rolling_writer(path: &Path) -> Result<(BoxMakeWriter, WorkerGuard), LlmError> {
    let directory = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(directory).map_err(|e| {
        LlmError::ConfigurationError(format!(
            "Failed to create log directory {}: {e}",
            directory.display()
        ))
    })?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(DEFAULT_LOG_FILE);

    let appender = tracing_appender::rolling::daily(directory, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    Ok((BoxMakeWriter::new(writer), guard))
}
