//! Flat-text export of the summary store.
//!
//! Each record becomes three lines followed by a separator:
//!
//! ```text
//! https://example.com/article
//! 3 march 2024
//! The summary, whitespace collapsed to single spaces.
//! ================================================================================
//! ```
//!
//! The export is a one-way projection: it is regenerated from the store on
//! every run and never read back.

use crate::config::{DateFormat, LineEnding, OutputSettings, Separator};
use crate::models::SummaryRecord;
use crate::store::{tmp_path, SummaryStore};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use flate2::write::GzEncoder;
use flate2::Compression;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{info, instrument};

const RULE_WIDTH: usize = 80;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("export I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to compress export: {0}")]
    Compress(#[source] std::io::Error),
}

/// Formatting and destination choices for the export.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub date_format: DateFormat,
    pub separator: Separator,
    pub line_ending: LineEnding,
    pub compress: bool,
    pub file_prefix: String,
    pub directory: PathBuf,
}

impl ExportOptions {
    pub fn from_settings(output: &OutputSettings) -> Self {
        Self {
            date_format: output.date_format,
            separator: output.separator,
            line_ending: output.line_ending,
            compress: output.compress,
            file_prefix: output.file_prefix.clone(),
            directory: output.export_dir(),
        }
    }

    /// `<prefix>summaries_<YYYYMMDD>.txt`, with `.gz` appended when compressed.
    pub fn file_name(&self, day: NaiveDate) -> String {
        let mut name = format!("{}summaries_{}.txt", self.file_prefix, day.format("%Y%m%d"));
        if self.compress {
            name.push_str(".gz");
        }
        name
    }
}

/// Collapse every whitespace run (newlines, tabs, Unicode spaces) to one
/// ASCII space and trim the ends.
pub fn normalize_text(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.date());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

/// Render a stored date; values that don't parse pass through unchanged.
pub fn format_date(raw: &str, format: DateFormat) -> String {
    let raw = raw.trim();
    if format == DateFormat::Iso {
        return raw.to_string();
    }
    match parse_date(raw) {
        Some(day) => match format {
            DateFormat::Long => day.format("%-d %B %Y").to_string().to_lowercase(),
            DateFormat::Numeric => day.format("%d-%m-%Y").to_string(),
            DateFormat::Iso => raw.to_string(),
        },
        None => raw.to_string(),
    }
}

fn render_record(out: &mut String, record: &SummaryRecord, options: &ExportOptions) {
    let eol = options.line_ending.as_str();
    for line in [
        normalize_text(&record.url),
        normalize_text(&format_date(&record.date, options.date_format)),
        normalize_text(&record.summary),
    ] {
        out.push_str(&line);
        out.push_str(eol);
    }
    if options.separator == Separator::Rule {
        out.push_str(&"=".repeat(RULE_WIDTH));
    }
    out.push_str(eol);
}

/// Render the store's records, in store order, to export bytes.
pub fn render(store: &SummaryStore, options: &ExportOptions) -> Result<Vec<u8>, ExportError> {
    let mut text = String::new();
    for record in store.records() {
        render_record(&mut text, record, options);
    }

    if !options.compress {
        return Ok(text.into_bytes());
    }
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(text.as_bytes())
        .map_err(ExportError::Compress)?;
    encoder.finish().map_err(ExportError::Compress)
}

/// Write export bytes to `dest`, replacing any previous file atomically.
#[instrument(level = "info", skip_all, fields(path = %dest.display(), bytes = bytes.len()))]
pub async fn write(bytes: &[u8], dest: &Path) -> Result<(), ExportError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| ExportError::Io { path, source }
    };

    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.map_err(io_err(parent))?;
    }
    let tmp = tmp_path(dest);
    fs::write(&tmp, bytes).await.map_err(io_err(&tmp))?;
    if let Err(e) = fs::rename(&tmp, dest).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(io_err(dest)(e));
    }
    info!("Wrote export");
    Ok(())
}

/// Render the store and write it to today's export file.
pub async fn export_store(
    store: &SummaryStore,
    options: &ExportOptions,
    day: NaiveDate,
) -> Result<PathBuf, ExportError> {
    let bytes = render(store, options)?;
    let dest = options.directory.join(options.file_name(day));
    write(&bytes, &dest).await?;
    info!(path = %dest.display(), records = store.len(), "Exported summaries");
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StoreDocument;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn options() -> ExportOptions {
        ExportOptions {
            date_format: DateFormat::Iso,
            separator: Separator::Rule,
            line_ending: LineEnding::Crlf,
            compress: false,
            file_prefix: String::new(),
            directory: PathBuf::from("out"),
        }
    }

    fn record(url: &str, date: &str, summary: &str) -> SummaryRecord {
        SummaryRecord {
            url: url.to_string(),
            title: None,
            summary: summary.to_string(),
            date: date.to_string(),
            extra: Default::default(),
        }
    }

    fn store(records: Vec<SummaryRecord>) -> SummaryStore {
        SummaryStore::from_document(StoreDocument { summaries: records })
    }

    fn render_text(store: &SummaryStore, options: &ExportOptions) -> String {
        String::from_utf8(render(store, options).unwrap()).unwrap()
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  a\n\nb\tc\r\nd\u{00a0}e\u{2028}f  "), "a b c d e f");
        assert_eq!(normalize_text(""), "");
    }

    #[test]
    fn test_format_date_variants() {
        let raw = "2024-03-03T12:34:56.123456";
        assert_eq!(format_date(raw, DateFormat::Iso), raw);
        assert_eq!(format_date(raw, DateFormat::Long), "3 march 2024");
        assert_eq!(format_date(raw, DateFormat::Numeric), "03-03-2024");
        assert_eq!(format_date("2024-12-25T08:00:00+02:00", DateFormat::Long), "25 december 2024");
        assert_eq!(format_date("2024-01-09", DateFormat::Numeric), "09-01-2024");
        assert_eq!(format_date("2024-01-09T10:00:00", DateFormat::Numeric), "09-01-2024");
    }

    #[test]
    fn test_unparsable_date_passes_through() {
        assert_eq!(format_date("last tuesday", DateFormat::Long), "last tuesday");
        assert_eq!(format_date(" yesterday ", DateFormat::Numeric), "yesterday");
    }

    #[test]
    fn test_render_two_blocks_in_order() {
        let store = store(vec![
            record("https://a.test/1", "2024-03-03T10:00:00", "Summary A"),
            record("https://a.test/2", "2024-03-04T10:00:00", "Summary B"),
        ]);
        let rule = "=".repeat(80);
        let expected = format!(
            "https://a.test/1\r\n2024-03-03T10:00:00\r\nSummary A\r\n{rule}\r\n\
             https://a.test/2\r\n2024-03-04T10:00:00\r\nSummary B\r\n{rule}\r\n"
        );
        assert_eq!(render_text(&store, &options()), expected);
    }

    #[test]
    fn test_embedded_newlines_do_not_break_lines() {
        let store = store(vec![record(
            " https://a.test/1 ",
            "2024-03-03T10:00:00",
            "Line one.\nLine two.\tTabbed.\r\n\r\nEnd.",
        )]);
        let opts = ExportOptions {
            line_ending: LineEnding::Lf,
            separator: Separator::Blank,
            ..options()
        };
        let text = render_text(&store, &opts);
        let lines: Vec<&str> = text.split('\n').collect();
        assert_eq!(
            lines,
            vec![
                "https://a.test/1",
                "2024-03-03T10:00:00",
                "Line one. Line two. Tabbed. End.",
                "",
                ""
            ]
        );
        assert!(!text.contains('\t'));
    }

    #[test]
    fn test_long_dates_in_render() {
        let store = store(vec![record("u", "2024-03-03T10:00:00", "s")]);
        let opts = ExportOptions {
            date_format: DateFormat::Long,
            ..options()
        };
        assert!(render_text(&store, &opts).starts_with("u\r\n3 march 2024\r\ns\r\n"));
    }

    #[test]
    fn test_empty_store_renders_nothing() {
        assert!(render(&SummaryStore::new(), &options()).unwrap().is_empty());
    }

    #[test]
    fn test_compressed_render_decodes() {
        let store = store(vec![record("u", "d", "s")]);
        let plain = render(&store, &options()).unwrap();
        let gz = render(&store, &ExportOptions { compress: true, ..options() }).unwrap();
        assert_eq!(&gz[..2], &[0x1f, 0x8b]);

        let mut decoded = Vec::new();
        GzDecoder::new(gz.as_slice()).read_to_end(&mut decoded).unwrap();
        assert_eq!(decoded, plain);
    }

    #[test]
    fn test_file_name() {
        let day = NaiveDate::from_ymd_opt(2025, 5, 6).unwrap();
        assert_eq!(options().file_name(day), "summaries_20250506.txt");
        let opts = ExportOptions {
            file_prefix: "tech_".to_string(),
            compress: true,
            ..options()
        };
        assert_eq!(opts.file_name(day), "tech_summaries_20250506.txt.gz");
    }

    #[tokio::test]
    async fn test_export_store_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let opts = ExportOptions {
            directory: dir.path().join("txt_summaries"),
            ..options()
        };
        let store = store(vec![record("u", "d", "s")]);
        let day = NaiveDate::from_ymd_opt(2025, 5, 6).unwrap();

        let path = export_store(&store, &opts, day).await.unwrap();
        assert_eq!(path, dir.path().join("txt_summaries/summaries_20250506.txt"));
        assert_eq!(std::fs::read(&path).unwrap(), render(&store, &opts).unwrap());
        assert!(!tmp_path(&path).exists());
    }
}
