//! Command-line interface definitions.
//!
//! Paths and overrides come from flags; everything else lives in the YAML
//! settings file. The API key may also be supplied through `OPENAI_API_KEY`.

use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for Article Digest.
///
/// # Examples
///
/// ```sh
/// # Summarize every new URL in link.txt using ./config.yaml
/// article_digest
///
/// # Different URL list, plus an RSS feed
/// article_digest -u reading_list.txt -f https://example.com/rss.xml
///
/// # Only regenerate the text export from the existing store
/// article_digest --export-only
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the YAML settings file
    #[arg(short, long, default_value = "config.yaml")]
    pub config: PathBuf,

    /// Newline-delimited list of article URLs
    #[arg(short, long, default_value = "link.txt")]
    pub urls: PathBuf,

    /// RSS or Atom feed to pull extra article URLs from (repeatable)
    #[arg(short, long = "feed")]
    pub feeds: Vec<String>,

    /// Render the existing store to the text export and exit
    #[arg(long, conflicts_with = "no_export")]
    pub export_only: bool,

    /// Skip the text export after the run
    #[arg(long)]
    pub no_export: bool,

    /// API key for the summarization service
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Log filter overriding `logging.level` (e.g. `debug`)
    #[arg(short = 'v', long)]
    pub log_level: Option<String>,
}
