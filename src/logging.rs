//! Tracing subscriber setup.
//!
//! `RUST_LOG` wins when set; otherwise the configured level applies. Logs
//! go to stderr, or are appended to `logging.file` when one is configured.

use crate::config::LoggingSettings;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::{fmt as tfmt, EnvFilter};

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter `{directive}`: {source}")]
    Filter {
        directive: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },
    #[error("cannot open log file {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Build the filter: `RUST_LOG`, then `override_level`, then the settings.
pub fn build_filter(
    settings: &LoggingSettings,
    override_level: Option<&str>,
) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let directive = override_level.unwrap_or(&settings.level);
    EnvFilter::try_new(directive).map_err(|source| LoggingError::Filter {
        directive: directive.to_string(),
        source,
    })
}

/// Install the global subscriber.
pub fn init(settings: &LoggingSettings, override_level: Option<&str>) -> Result<(), LoggingError> {
    let filter = build_filter(settings, override_level)?;
    let builder = tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(UtcTime::rfc_3339());

    match &settings.file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|source| LoggingError::File {
                    path: path.clone(),
                    source,
                })?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| LoggingError::File {
                    path: path.clone(),
                    source,
                })?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}
