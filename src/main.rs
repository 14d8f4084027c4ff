//! # Article Digest
//!
//! Fetches article pages from a list of URLs, summarizes them with an
//! OpenAI-compatible LLM, and keeps the results in a deduplicated JSON store
//! with a flat-text export for reading.
//!
//! ## Features
//!
//! - Incremental: URLs already in the store are skipped, so the URL list can
//!   grow between runs
//! - Configurable HTML extraction with request pacing
//! - Rate-limited, retrying summarization calls
//! - Atomic store writes with timestamped backups
//! - Plain or gzip text export with selectable date and separator styles
//! - Optional RSS/Atom feeds as an extra URL source
//!
//! ## Usage
//!
//! ```sh
//! OPENAI_API_KEY=sk-... article_digest -c config.yaml -u link.txt
//! ```
//!
//! ## Architecture
//!
//! The application is a linear pipeline:
//! 1. **Input**: read the URL list (and any feeds)
//! 2. **Extraction**: fetch each new URL and pull title and paragraphs
//! 3. **Summarization**: send the article text to the LLM
//! 4. **Store**: append successful summaries, save once at the end
//! 5. **Export**: render the whole store to a text file

use chrono::Local;
use clap::Parser;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

mod api;
mod cli;
mod config;
mod error;
mod feeds;
mod input;
mod logging;
mod models;
mod outputs;
mod pacing;
mod pipeline;
mod scrapers;
mod store;
mod utils;

use cli::Cli;
use config::Settings;
use error::AppError;
use outputs::export::{self, ExportOptions};
use pipeline::{Pipeline, RunReport};
use scrapers::ArticleScraper;
use store::{StoreLocation, SummaryStore};
use utils::ensure_writable_dir;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Cli::parse();
    match run(args).await {
        Ok(Some(report)) if report.failed > 0 => {
            warn!(failed = report.failed, "Some articles could not be summarized");
            ExitCode::SUCCESS
        }
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Run failed");
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Ctrl-C once stops the run before the next URL; twice exits immediately.
fn watch_for_interrupt(cancel: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("Interrupt received; finishing the current article, then saving");
        cancel.store(true, Ordering::SeqCst);

        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("interrupted again; exiting without saving");
            std::process::exit(130);
        }
    });
}

/// Execute one run. Returns `None` for `--export-only`.
async fn run(args: Cli) -> Result<Option<RunReport>, AppError> {
    let settings = Settings::load(&args.config).await?;
    logging::init(&settings.logging, args.log_level.as_deref())?;

    let start_time = std::time::Instant::now();
    info!(config = %args.config.display(), "article_digest starting up");

    // Fail before any network work if results could not be saved.
    for dir in settings.output.writable_dirs(!args.no_export) {
        ensure_writable_dir(&dir)
            .await
            .map_err(|source| AppError::OutputDir { path: dir.clone(), source })?;
    }

    let location = StoreLocation::from_settings(&settings.output);
    let export_options = ExportOptions::from_settings(&settings.output);
    let today = Local::now().date_naive();

    if args.export_only {
        let store = SummaryStore::load(&location.path).await;
        let path = export::export_store(&store, &export_options, today).await?;
        println!("Exported {} summaries to {}", store.len(), path.display());
        return Ok(None);
    }

    let mut urls = input::read_url_list(&args.urls).await?;
    let feed_list: Vec<String> = settings
        .feeds
        .iter()
        .chain(args.feeds.iter())
        .cloned()
        .collect();
    let discovered = feeds::discover_all(&feed_list, settings.scraping.timeout()).await;
    if !discovered.is_empty() {
        info!(count = discovered.len(), "Adding URLs from feeds");
        urls.extend(discovered);
    }

    let mut store = SummaryStore::load(&location.path).await;

    let system_prompt = settings.system_prompt().await?;
    let scraper = ArticleScraper::new(&settings.scraping)?;
    let summarizer = api::build_summarizer(&settings.summarization, args.api_key, system_prompt)?;

    let cancel = Arc::new(AtomicBool::new(false));
    watch_for_interrupt(Arc::clone(&cancel));

    let report = Pipeline::new(scraper, summarizer)
        .with_cancel_flag(cancel)
        .run(&urls, &mut store)
        .await;

    store.save(&location).await?;
    println!(
        "Saved {} summaries to {}",
        store.len(),
        location.path.display()
    );

    if !args.no_export {
        let path = export::export_store(&store, &export_options, today).await?;
        println!("Exported summaries to {}", path.display());
    }

    print!("{}", report);

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    Ok(Some(report))
}
