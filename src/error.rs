//! Run-level errors.
//!
//! Only these end a run early. Per-URL failures never get here; they are
//! collected in the [`RunReport`](crate::pipeline::RunReport) instead.

use crate::api::SummarizeError;
use crate::config::ConfigError;
use crate::input::InputError;
use crate::logging::LoggingError;
use crate::outputs::export::ExportError;
use crate::scrapers::ExtractError;
use crate::store::StoreError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Logging(#[from] LoggingError),
    #[error(transparent)]
    Input(#[from] InputError),
    #[error("output directory {path} is not writable: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("cannot set up article scraper: {0}")]
    Scraper(#[from] ExtractError),
    #[error("cannot set up summarizer: {0}")]
    Summarizer(#[from] SummarizeError),
    #[error("failed to save summaries: {0}")]
    Store(#[from] StoreError),
    #[error("failed to write export: {0}")]
    Export(#[from] ExportError),
}
