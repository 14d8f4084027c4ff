//! Per-URL orchestration: skip, extract, summarize, record.
//!
//! URLs are handled strictly in input order, one at a time. Every per-URL
//! failure is logged and collected into the [`RunReport`]; nothing short of
//! the caller's save/export step can fail the run as a whole.

use crate::api::Summarize;
use crate::models::SummaryRecord;
use crate::scrapers::Extract;
use crate::store::SummaryStore;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Which step a URL failed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extraction,
    Summarization,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Extraction => f.write_str("extraction"),
            Stage::Summarization => f.write_str("summarization"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub url: String,
    pub stage: Stage,
    pub reason: String,
}

/// Outcome counts for one run.
///
/// `processed` counts URLs that were attempted (not skipped, not cancelled),
/// so `processed == succeeded + failed`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub processed: usize,
    pub skipped: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// URLs left untouched because the run was interrupted.
    pub cancelled: usize,
    pub failures: Vec<Failure>,
}

impl RunReport {
    fn record_failure(&mut self, url: &str, stage: Stage, reason: String) {
        self.failed += 1;
        self.failures.push(Failure {
            url: url.to_string(),
            stage,
            reason,
        });
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "processed: {}, skipped: {}, succeeded: {}, failed: {}",
            self.processed, self.skipped, self.succeeded, self.failed
        )?;
        if self.cancelled > 0 {
            writeln!(f, "cancelled before processing: {}", self.cancelled)?;
        }
        if !self.failures.is_empty() {
            writeln!(f, "failures:")?;
            for failure in &self.failures {
                writeln!(f, "  {} ({}): {}", failure.url, failure.stage, failure.reason)?;
            }
        }
        Ok(())
    }
}

/// Drives extraction and summarization for a list of URLs.
#[derive(Debug)]
pub struct Pipeline<E, S> {
    extractor: E,
    summarizer: S,
    cancel: Arc<AtomicBool>,
}

impl<E, S> Pipeline<E, S>
where
    E: Extract,
    S: Summarize,
{
    pub fn new(extractor: E, summarizer: S) -> Self {
        Self {
            extractor,
            summarizer,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share a flag that stops the run before the next URL when set.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Process `urls` in order, appending new summaries to `store`.
    ///
    /// URLs already in the store are skipped. A URL whose extraction or
    /// summarization fails leaves no record, so the next run retries it.
    #[instrument(level = "info", skip_all, fields(urls = urls.len()))]
    pub async fn run(&self, urls: &[String], store: &mut SummaryStore) -> RunReport {
        let mut report = RunReport::default();

        for (index, url) in urls.iter().enumerate() {
            if self.cancel.load(Ordering::SeqCst) {
                report.cancelled = urls.len() - index;
                warn!(remaining = report.cancelled, "Run interrupted; stopping before next URL");
                break;
            }

            if store.contains_url(url) {
                info!(%url, "Already summarized; skipping");
                report.skipped += 1;
                continue;
            }

            info!(%url, index, "Processing");
            report.processed += 1;

            let article = match self.extractor.extract(url).await {
                Ok(article) => article,
                Err(e) => {
                    error!(%url, error = %e, "Extraction failed");
                    report.record_failure(url, Stage::Extraction, e.to_string());
                    continue;
                }
            };

            debug!(%url, fetched_at = %article.fetched_at, paragraphs = article.paragraphs.len(), "Extracted");

            let summary = match self.summarizer.summarize(&article.text()).await {
                Ok(summary) => summary,
                Err(e) => {
                    error!(%url, error = %e, "Summarization failed");
                    report.record_failure(url, Stage::Summarization, e.to_string());
                    continue;
                }
            };

            let title = Some(article.title).filter(|t| !t.is_empty());
            store.append(SummaryRecord::new(url.as_str(), title, summary));
            report.succeeded += 1;
            info!(%url, "Summary added");
        }

        info!(
            processed = report.processed,
            skipped = report.skipped,
            succeeded = report.succeeded,
            failed = report.failed,
            cancelled = report.cancelled,
            "Run complete"
        );
        report
    }
}
