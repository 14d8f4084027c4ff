//! Durable, deduplicated collection of summaries.
//!
//! The store is loaded once at the start of a run, grows in memory as
//! articles are summarized, and is written back once at the end.
//!
//! # Guarantees
//!
//! - Loading never fails: a missing or unreadable store starts empty. A
//!   store that exists but does not parse is renamed to
//!   `<store>.corrupt-<timestamp>` first, so the next save cannot destroy it.
//! - URLs are unique. Callers check [`SummaryStore::contains_url`] before
//!   [`SummaryStore::append`]; the store itself does not drop duplicates.
//! - Saving copies the previous file to a timestamped backup (when enabled)
//!   and replaces the store through a temp file and `rename`, so readers see
//!   either the old or the new document, never a truncated one.

use crate::config::OutputSettings;
use crate::models::{StoreDocument, SummaryRecord};
use chrono::Local;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{info, instrument, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize summaries: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("invalid backup timestamp format `{0}`")]
    TimestampFormat(String),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Where and how the store is persisted.
#[derive(Debug, Clone)]
pub struct StoreLocation {
    pub path: PathBuf,
    /// Backups go here when set; `None` disables them.
    pub backup_dir: Option<PathBuf>,
    pub backup_timestamp_format: String,
}

impl StoreLocation {
    pub fn from_settings(output: &OutputSettings) -> Self {
        Self {
            path: output.store_path(),
            backup_dir: output.backup.then(|| output.backup_dir()),
            backup_timestamp_format: output.backup_timestamp_format.clone(),
        }
    }
}

/// In-memory summary store with a URL index.
#[derive(Debug, Default)]
pub struct SummaryStore {
    document: StoreDocument,
    seen: HashSet<String>,
}

impl SummaryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_document(document: StoreDocument) -> Self {
        let seen = document.summaries.iter().map(|r| r.url.clone()).collect();
        Self { document, seen }
    }

    /// Read the store at `path`.
    ///
    /// A missing file is a first run; unreadable or malformed content is
    /// logged and treated the same way.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub async fn load(path: &Path) -> Self {
        let text = match fs::read_to_string(path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No existing store; starting empty");
                return Self::new();
            }
            Err(e) => {
                warn!(error = %e, "Failed to read store; starting empty");
                return Self::new();
            }
        };

        match serde_json::from_str::<StoreDocument>(&text) {
            Ok(document) => {
                let store = Self::from_document(document);
                info!(count = store.len(), "Loaded existing summaries");
                store
            }
            Err(e) => {
                warn!(error = %e, "Store is not valid JSON; starting empty");
                let aside = corrupt_path(path);
                match fs::rename(path, &aside).await {
                    Ok(()) => warn!(moved_to = %aside.display(), "Kept unreadable store aside"),
                    Err(e) => warn!(error = %e, "Could not move unreadable store aside"),
                }
                Self::new()
            }
        }
    }

    /// Whether a summary for exactly this URL string is already stored.
    pub fn contains_url(&self, url: &str) -> bool {
        self.seen.contains(url)
    }

    /// Add a record and mark its URL as seen.
    pub fn append(&mut self, record: SummaryRecord) {
        self.seen.insert(record.url.clone());
        self.document.summaries.push(record);
    }

    pub fn records(&self) -> &[SummaryRecord] {
        &self.document.summaries
    }

    pub fn len(&self) -> usize {
        self.document.summaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.document.summaries.is_empty()
    }

    /// Pretty-printed JSON exactly as written to disk.
    pub fn to_json(&self) -> Result<String, StoreError> {
        let mut json = serde_json::to_string_pretty(&self.document)?;
        json.push('\n');
        Ok(json)
    }

    /// Persist the store, backing up the previous file first.
    ///
    /// Returns the backup path when one was written.
    #[instrument(level = "info", skip_all, fields(path = %location.path.display(), count = self.len()))]
    pub async fn save(&self, location: &StoreLocation) -> Result<Option<PathBuf>, StoreError> {
        let json = self.to_json()?;

        if let Some(parent) = location.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(io_err(parent))?;
        }

        let previous_exists = fs::try_exists(&location.path).await.unwrap_or(false);
        let backup = match &location.backup_dir {
            Some(dir) if previous_exists => {
                let backup_path =
                    backup_path(dir, &location.backup_timestamp_format).await?;
                fs::copy(&location.path, &backup_path)
                    .await
                    .map_err(io_err(&backup_path))?;
                info!(backup = %backup_path.display(), "Backed up previous store");
                Some(backup_path)
            }
            _ => None,
        };

        let tmp = tmp_path(&location.path);
        fs::write(&tmp, json.as_bytes()).await.map_err(io_err(&tmp))?;
        if let Err(e) = fs::rename(&tmp, &location.path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(io_err(&location.path)(e));
        }

        info!("Summaries saved");
        Ok(backup)
    }
}

/// Sibling temp file used for the atomic replace.
pub(crate) fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// `<store>.corrupt-<timestamp>` beside the store.
fn corrupt_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".corrupt-{}", Local::now().format("%Y%m%d_%H%M%S%.6f")));
    path.with_file_name(name)
}

/// Pick an unused `backup_<timestamp>[_n].json` name in `dir`.
async fn backup_path(dir: &Path, timestamp_format: &str) -> Result<PathBuf, StoreError> {
    let mut stamp = String::new();
    write!(stamp, "{}", Local::now().format(timestamp_format))
        .map_err(|_| StoreError::TimestampFormat(timestamp_format.to_string()))?;
    fs::create_dir_all(dir).await.map_err(io_err(dir))?;

    let mut candidate = dir.join(format!("backup_{}.json", stamp));
    let mut n = 1;
    while fs::try_exists(&candidate).await.map_err(io_err(&candidate))? {
        candidate = dir.join(format!("backup_{}_{}.json", stamp, n));
        n += 1;
    }
    Ok(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location(dir: &Path, backups: bool) -> StoreLocation {
        StoreLocation {
            path: dir.join("all_summaries.json"),
            backup_dir: backups.then(|| dir.join("backups")),
            backup_timestamp_format: "%Y%m%d_%H%M%S".to_string(),
        }
    }

    fn record(url: &str, summary: &str) -> SummaryRecord {
        SummaryRecord::new(url, None, summary)
    }

    fn backups_in(dir: &Path) -> Vec<PathBuf> {
        let mut found: Vec<PathBuf> = std::fs::read_dir(dir)
            .map(|entries| entries.filter_map(|e| e.ok()).map(|e| e.path()).collect())
            .unwrap_or_default();
        found.sort();
        found
    }

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SummaryStore::load(&dir.path().join("missing.json")).await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_load_corrupt_file_is_empty_and_kept_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("all_summaries.json");
        std::fs::write(&path, "{\"summaries\": [").unwrap();
        let store = SummaryStore::load(&path).await;
        assert!(store.is_empty());
        assert!(!path.exists());

        let kept = backups_in(dir.path());
        assert_eq!(kept.len(), 1);
        let name = kept[0].file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("all_summaries.json.corrupt-"), "{name}");
        assert_eq!(std::fs::read_to_string(&kept[0]).unwrap(), "{\"summaries\": [");
    }

    #[tokio::test]
    async fn test_corrupt_store_survives_save_without_backups() {
        let dir = tempfile::tempdir().unwrap();
        let loc = location(dir.path(), false);
        std::fs::write(&loc.path, "not json").unwrap();

        let mut store = SummaryStore::load(&loc.path).await;
        store.append(record("https://a.test/1", "A"));
        store.save(&loc).await.unwrap();

        let files = backups_in(dir.path());
        assert_eq!(files.len(), 2);
        assert!(files.iter().any(|f| std::fs::read_to_string(f).unwrap() == "not json"));
        assert!(SummaryStore::load(&loc.path).await.contains_url("https://a.test/1"));
    }

    #[tokio::test]
    async fn test_bad_timestamp_format_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let loc = StoreLocation {
            backup_timestamp_format: "%Y%m%d_%Q".to_string(),
            ..location(dir.path(), true)
        };
        let store = SummaryStore::new();
        store.save(&loc).await.unwrap();
        assert!(matches!(
            store.save(&loc).await,
            Err(StoreError::TimestampFormat(_))
        ));
        assert!(loc.path.exists());
    }

    #[test]
    fn test_contains_and_append() {
        let mut store = SummaryStore::new();
        assert!(!store.contains_url("https://a.test/1"));
        store.append(record("https://a.test/1", "S"));
        assert!(store.contains_url("https://a.test/1"));
        // Exact match only.
        assert!(!store.contains_url("https://a.test/1/"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_index_built_from_document() {
        let doc = StoreDocument {
            summaries: vec![record("https://a.test/1", "S"), record("https://a.test/2", "T")],
        };
        let store = SummaryStore::from_document(doc);
        assert!(store.contains_url("https://a.test/2"));
        assert!(!store.contains_url("https://a.test/3"));
    }

    #[tokio::test]
    async fn test_save_load_save_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let loc = location(dir.path(), false);

        let mut store = SummaryStore::new();
        store.append(record("https://a.test/1", "Résumé A"));
        store.append(SummaryRecord::new("https://a.test/2", Some("Title".into()), "Summary B"));
        store.save(&loc).await.unwrap();
        let first = std::fs::read_to_string(&loc.path).unwrap();

        let reloaded = SummaryStore::load(&loc.path).await;
        reloaded.save(&loc).await.unwrap();
        let second = std::fs::read_to_string(&loc.path).unwrap();

        assert_eq!(first, second);
        assert!(first.contains("Résumé A"));
        assert!(first.contains("\n  \"summaries\": ["));
        assert_eq!(reloaded.records(), store.records());
    }

    #[tokio::test]
    async fn test_save_creates_directory_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let loc = location(&dir.path().join("nested/out"), false);
        SummaryStore::new().save(&loc).await.unwrap();
        assert!(loc.path.exists());
        assert!(!tmp_path(&loc.path).exists());
    }

    #[tokio::test]
    async fn test_first_save_writes_no_backup() {
        let dir = tempfile::tempdir().unwrap();
        let loc = location(dir.path(), true);
        let backup = SummaryStore::new().save(&loc).await.unwrap();
        assert!(backup.is_none());
    }

    #[tokio::test]
    async fn test_backups_rotate_without_collision() {
        let dir = tempfile::tempdir().unwrap();
        let loc = location(dir.path(), true);

        let mut store = SummaryStore::new();
        store.append(record("https://a.test/1", "A"));
        store.save(&loc).await.unwrap();
        let state_one = std::fs::read_to_string(&loc.path).unwrap();

        store.append(record("https://a.test/2", "B"));
        let first_backup = store.save(&loc).await.unwrap().unwrap();
        let state_two = std::fs::read_to_string(&loc.path).unwrap();

        store.append(record("https://a.test/3", "C"));
        let second_backup = store.save(&loc).await.unwrap().unwrap();

        assert_ne!(first_backup, second_backup);
        assert_eq!(backups_in(&dir.path().join("backups")).len(), 2);
        assert_eq!(std::fs::read_to_string(&first_backup).unwrap(), state_one);
        assert_eq!(std::fs::read_to_string(&second_backup).unwrap(), state_two);
    }

    #[tokio::test]
    async fn test_backups_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let loc = location(dir.path(), false);
        let store = SummaryStore::new();
        store.save(&loc).await.unwrap();
        assert!(store.save(&loc).await.unwrap().is_none());
        assert!(!dir.path().join("backups").exists());
    }

    #[tokio::test]
    async fn test_save_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the store file should be makes the rename fail.
        let path = dir.path().join("all_summaries.json");
        std::fs::create_dir_all(path.join("occupied")).unwrap();
        let loc = StoreLocation {
            path,
            backup_dir: None,
            backup_timestamp_format: "%Y".to_string(),
        };
        assert!(matches!(
            SummaryStore::new().save(&loc).await,
            Err(StoreError::Io { .. })
        ));
    }
}
