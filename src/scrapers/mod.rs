//! Article extraction: turning a URL into title and paragraph text.
//!
//! The pipeline depends only on the [`Extract`] trait, so tests can swap the
//! network-backed [`ArticleScraper`] for an in-memory fake.
//!
//! # Failure kinds
//!
//! | Variant | Cause |
//! |---------|-------|
//! | [`ExtractError::Timeout`] | request exceeded `scraping.timeout` |
//! | [`ExtractError::Network`] | connection, TLS, or body read failure |
//! | [`ExtractError::Status`] | non-2xx response |
//! | [`ExtractError::MissingContent`] | no article container or no paragraphs |

pub mod article;

use crate::models::Article;
use thiserror::Error;

pub use article::ArticleScraper;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),
    #[error("server responded with HTTP {0}")]
    Status(u16),
    #[error("couldn't find article content; the page may load it with JavaScript")]
    MissingContent,
    #[error("invalid header `{0}`")]
    InvalidHeader(String),
    #[error("invalid selector `{0}`")]
    InvalidSelector(String),
}

impl From<reqwest::Error> for ExtractError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ExtractError::Timeout
        } else {
            ExtractError::Network(e)
        }
    }
}

/// Something that can fetch and parse an article.
pub trait Extract {
    async fn extract(&self, url: &str) -> Result<Article, ExtractError>;
}
