//! URL discovery from RSS 2.0 and Atom feeds.
//!
//! Feeds are an optional extra input: their item links are appended to the
//! URL list read from disk. A feed that cannot be fetched or parsed is
//! logged and skipped.

use itertools::Itertools;
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument, warn};
use url::Url;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("invalid feed URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("server responded with HTTP {0}")]
    Status(u16),
    #[error("malformed feed: {0}")]
    Xml(#[from] quick_xml::Error),
}

/// `href` of an Atom-style `<link>`, ignoring non-alternate relations.
fn link_href(e: &BytesStart<'_>) -> Result<Option<String>, FeedError> {
    if let Some(rel) = e
        .try_get_attribute("rel")
        .map_err(quick_xml::Error::from)?
    {
        if rel.unescape_value()?.as_ref() != "alternate" {
            return Ok(None);
        }
    }
    match e.try_get_attribute("href").map_err(quick_xml::Error::from)? {
        Some(href) => Ok(Some(href.unescape_value()?.trim().to_string())),
        None => Ok(None),
    }
}

/// Extract item links from a feed document, resolved against `base`.
///
/// RSS `<item><link>` text and Atom `<entry><link href>` are both accepted;
/// only the first usable link of each item counts. Exact duplicates are
/// dropped, keeping document order.
pub fn parse_feed_links(xml: &str, base: &Url) -> Result<Vec<String>, FeedError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut in_item = false;
    let mut item_link: Option<String> = None;
    let mut capturing = false;
    let mut text = String::new();
    let mut links = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"item" | b"entry" => {
                    in_item = true;
                    item_link = None;
                }
                b"link" if in_item && item_link.is_none() => match link_href(&e)? {
                    Some(href) => item_link = Some(href),
                    None => {
                        capturing = true;
                        text.clear();
                    }
                },
                _ => {}
            },
            Event::Empty(e) => {
                if in_item && item_link.is_none() && e.local_name().as_ref() == b"link" {
                    item_link = link_href(&e)?;
                }
            }
            Event::Text(t) if capturing => {
                text.push_str(&t.decode().map_err(quick_xml::Error::from)?);
            }
            Event::CData(t) if capturing => {
                text.push_str(&t.decode().map_err(quick_xml::Error::from)?);
            }
            Event::GeneralRef(r) if capturing => match r.resolve_char_ref()? {
                Some(ch) => text.push(ch),
                None => {
                    let name = r.decode().map_err(quick_xml::Error::from)?;
                    match resolve_predefined_entity(&name) {
                        Some(resolved) => text.push_str(resolved),
                        None => {
                            text.push('&');
                            text.push_str(&name);
                            text.push(';');
                        }
                    }
                }
            },
            Event::End(e) => match e.local_name().as_ref() {
                b"link" if capturing => {
                    capturing = false;
                    let link = text.trim();
                    if !link.is_empty() {
                        item_link = Some(link.to_string());
                    }
                }
                b"item" | b"entry" => {
                    in_item = false;
                    links.extend(item_link.take());
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    let resolved = links
        .into_iter()
        .filter_map(|link| match base.join(&link) {
            Ok(url) => Some(url.to_string()),
            Err(e) => {
                warn!(%link, error = %e, "Skipping unresolvable feed link");
                None
            }
        })
        .unique()
        .collect();
    Ok(resolved)
}

/// Fetch one feed and return its article URLs.
#[instrument(level = "info", skip(client))]
pub async fn discover(client: &Client, feed_url: &str) -> Result<Vec<String>, FeedError> {
    let base = Url::parse(feed_url)?;
    let response = client.get(base.clone()).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(FeedError::Status(status.as_u16()));
    }
    let body = response.text().await?;
    let links = parse_feed_links(&body, &base)?;
    info!(count = links.len(), "Discovered feed entries");
    Ok(links)
}

/// Collect URLs from every feed, skipping feeds that fail.
pub async fn discover_all(feeds: &[String], timeout: Duration) -> Vec<String> {
    if feeds.is_empty() {
        return Vec::new();
    }
    let client = match Client::builder().timeout(timeout).build() {
        Ok(client) => client,
        Err(e) => {
            warn!(error = %e, "Could not build feed client; skipping feeds");
            return Vec::new();
        }
    };

    let mut urls = Vec::new();
    for feed in feeds {
        match discover(&client, feed).await {
            Ok(mut links) => urls.append(&mut links),
            Err(e) => warn!(%feed, error = %e, "Feed discovery failed; skipping feed"),
        }
    }
    urls
}
