//! Data models for fetched articles and stored summaries.
//!
//! - [`Article`]: transient extraction result, consumed by summarization
//! - [`SummaryRecord`]: one durable entry of the summary store
//! - [`StoreDocument`]: the on-disk shape `{"summaries": [...]}`

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A fetched article before summarization.
///
/// Never persisted as-is; only its summary ends up in the store.
#[derive(Debug, Clone)]
pub struct Article {
    /// The URL the article was fetched from.
    pub url: String,
    /// Headline text, empty when the page has none.
    pub title: String,
    /// Non-empty paragraph texts in document order.
    pub paragraphs: Vec<String>,
    pub fetched_at: DateTime<Local>,
}

impl Article {
    /// Render the article as the text block sent for summarization.
    ///
    /// ```text
    /// Title: <title>
    ///
    /// Content:
    /// <paragraph>
    /// <paragraph>
    /// ```
    pub fn text(&self) -> String {
        let body = self.paragraphs.join("\n");
        if self.title.is_empty() {
            format!("Content:\n{}", body)
        } else {
            format!("Title: {}\n\nContent:\n{}", self.title, body)
        }
    }
}

/// One completed summary.
///
/// Records are append-only: once written, `summary` and `date` never change.
/// Fields this version does not know about are kept in `extra` so older or
/// newer stores survive a load/save cycle intact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub summary: String,
    /// ISO-8601 timestamp of when the summary was produced.
    pub date: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SummaryRecord {
    /// Build a record stamped with the current local time.
    pub fn new(url: impl Into<String>, title: Option<String>, summary: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.filter(|t| !t.is_empty()),
            summary: summary.into(),
            date: Local::now()
                .naive_local()
                .format("%Y-%m-%dT%H:%M:%S%.6f")
                .to_string(),
            extra: Map::new(),
        }
    }
}

/// Serialized form of the summary store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreDocument {
    #[serde(default)]
    pub summaries: Vec<SummaryRecord>,
}
