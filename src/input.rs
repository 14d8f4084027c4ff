//! Reading the URL list.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, instrument};

#[derive(Debug, Error)]
#[error("cannot read URL list {path}: {source}")]
pub struct InputError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// One URL per line; surrounding whitespace trimmed, blank lines dropped.
///
/// Order and duplicates are kept as written. No normalization happens, so
/// `https://a.test/x` and `https://a.test/x/` are different URLs.
pub fn parse_url_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn read_url_list(path: &Path) -> Result<Vec<String>, InputError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| InputError {
            path: path.to_path_buf(),
            source,
        })?;
    let urls = parse_url_list(&text);
    info!(count = urls.len(), "Read URL list");
    Ok(urls)
}
