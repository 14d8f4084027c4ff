//! Generic HTML article scraper.
//!
//! Fetches a page with the configured headers and timeout, then pulls the
//! headline and the paragraphs of the first matching article container.
//! Requests are paced by `scraping.delay_between_requests`.

use super::{Extract, ExtractError};
use crate::config::ScrapingSettings;
use crate::models::Article;
use crate::pacing::Pacer;
use chrono::Local;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, instrument};

/// Compiled CSS selectors for one page layout.
#[derive(Debug)]
pub struct PageSelectors {
    title: Selector,
    containers: Vec<Selector>,
    paragraph: Selector,
}

fn compile(selector: &str) -> Result<Selector, ExtractError> {
    Selector::parse(selector).map_err(|_| ExtractError::InvalidSelector(selector.to_string()))
}

impl PageSelectors {
    pub fn from_settings(settings: &ScrapingSettings) -> Result<Self, ExtractError> {
        Ok(Self {
            title: compile(&settings.title_selector)?,
            containers: settings
                .content_selectors
                .iter()
                .map(|s| compile(s))
                .collect::<Result<_, _>>()?,
            paragraph: compile(&settings.paragraph_selector)?,
        })
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Parse an article page.
///
/// The first container selector with a match wins; its non-empty paragraphs
/// become the article body. A page without one is [`ExtractError::MissingContent`].
pub fn parse_article(url: &str, html: &str, selectors: &PageSelectors) -> Result<Article, ExtractError> {
    let document = Html::parse_document(html);

    let title = document
        .select(&selectors.title)
        .next()
        .map(element_text)
        .unwrap_or_default();

    let container = selectors
        .containers
        .iter()
        .find_map(|sel| document.select(sel).next())
        .ok_or(ExtractError::MissingContent)?;

    let paragraphs: Vec<String> = container
        .select(&selectors.paragraph)
        .map(element_text)
        .filter(|p| !p.is_empty())
        .collect();

    if paragraphs.is_empty() {
        return Err(ExtractError::MissingContent);
    }

    Ok(Article {
        url: url.to_string(),
        title,
        paragraphs,
        fetched_at: Local::now(),
    })
}

/// Network-backed [`Extract`] implementation.
#[derive(Debug)]
pub struct ArticleScraper {
    client: Client,
    selectors: PageSelectors,
    pacer: Pacer,
}

impl ArticleScraper {
    pub fn new(settings: &ScrapingSettings) -> Result<Self, ExtractError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &settings.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| ExtractError::InvalidHeader(name.clone()))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| ExtractError::InvalidHeader(name.to_string()))?;
            headers.insert(name, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(settings.timeout())
            .build()
            .map_err(ExtractError::Network)?;

        Ok(Self {
            client,
            selectors: PageSelectors::from_settings(settings)?,
            pacer: Pacer::new(settings.delay()),
        })
    }
}

impl Extract for ArticleScraper {
    #[instrument(level = "info", skip_all, fields(%url))]
    async fn extract(&self, url: &str) -> Result<Article, ExtractError> {
        self.pacer.wait().await;

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ExtractError::Status(status.as_u16()));
        }
        let body = response.text().await?;
        debug!(bytes = body.len(), "Fetched page");

        let article = parse_article(url, &body, &self.selectors)?;
        info!(
            title = %article.title,
            paragraphs = article.paragraphs.len(),
            "Parsed article"
        );
        Ok(article)
    }
}
