//! Runtime settings loaded from `config.yaml`.
//!
//! The settings are read once in `main` and handed by reference to every
//! component that needs them. Every key is optional; a missing file yields
//! [`Settings::default`], a malformed one is a startup error.
//!
//! ```yaml
//! scraping:
//!   timeout: 30
//!   delay_between_requests: 1.0
//! output:
//!   directory: articles
//!   backup: true
//!   date_format: long
//!   compress: false
//! summarization:
//!   model: gpt-4
//!   retry_attempts: 3
//!   rate_limit: 50
//! logging:
//!   level: info
//! ```

use chrono::format::{Item, StrftimeItems};
use itertools::Itertools;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

/// Errors raised while reading the settings file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid setting `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// All configuration sections.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub scraping: ScrapingSettings,
    pub output: OutputSettings,
    pub summarization: SummarizationSettings,
    pub logging: LoggingSettings,
    /// RSS or Atom feeds whose item links are appended to the URL list.
    pub feeds: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScrapingSettings {
    /// Extra request headers sent with every page fetch.
    pub headers: BTreeMap<String, String>,
    /// Per-request timeout in seconds.
    pub timeout: u64,
    /// Minimum spacing between two page fetches, in seconds.
    pub delay_between_requests: f64,
    pub title_selector: String,
    /// Candidate article containers, tried in order.
    pub content_selectors: Vec<String>,
    pub paragraph_selector: String,
}

impl Default for ScrapingSettings {
    fn default() -> Self {
        let mut headers = BTreeMap::new();
        headers.insert(
            "User-Agent".to_string(),
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36"
                .to_string(),
        );
        Self {
            headers,
            timeout: 30,
            delay_between_requests: 1.0,
            title_selector: "h1".to_string(),
            content_selectors: vec!["article".to_string(), ".article-content".to_string()],
            paragraph_selector: "p".to_string(),
        }
    }
}

impl ScrapingSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn delay(&self) -> Duration {
        seconds(self.delay_between_requests)
    }
}

/// How dates are printed in the text export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateFormat {
    /// The stored value, untouched.
    #[default]
    Iso,
    /// `3 march 2024`
    Long,
    /// `03-03-2024`
    Numeric,
}

/// Record separator used in the text export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Separator {
    /// A line of 80 `=` characters.
    #[default]
    Rule,
    /// A single empty line.
    Blank,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineEnding {
    #[default]
    Crlf,
    Lf,
}

impl LineEnding {
    pub fn as_str(self) -> &'static str {
        match self {
            LineEnding::Crlf => "\r\n",
            LineEnding::Lf => "\n",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub directory: PathBuf,
    pub store_file: String,
    /// Copy the previous store aside before every save.
    pub backup: bool,
    pub backup_directory: Option<PathBuf>,
    pub backup_timestamp_format: String,
    pub date_format: DateFormat,
    pub file_prefix: String,
    pub compress: bool,
    pub separator: Separator,
    pub line_ending: LineEnding,
    pub export_directory: Option<PathBuf>,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("articles"),
            store_file: "all_summaries.json".to_string(),
            backup: true,
            backup_directory: None,
            backup_timestamp_format: "%Y%m%d_%H%M%S".to_string(),
            date_format: DateFormat::Iso,
            file_prefix: String::new(),
            compress: false,
            separator: Separator::Rule,
            line_ending: LineEnding::Crlf,
            export_directory: None,
        }
    }
}

impl OutputSettings {
    pub fn store_path(&self) -> PathBuf {
        self.directory.join(&self.store_file)
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.backup_directory
            .clone()
            .unwrap_or_else(|| self.directory.clone())
    }

    pub fn export_dir(&self) -> PathBuf {
        self.export_directory
            .clone()
            .unwrap_or_else(|| self.directory.join("txt_summaries"))
    }

    /// Every directory a run will write to: the store directory, the backup
    /// directory when backups are on, and the export directory when `export`.
    pub fn writable_dirs(&self, export: bool) -> Vec<PathBuf> {
        let mut dirs = vec![self.directory.clone()];
        if self.backup {
            dirs.push(self.backup_dir());
        }
        if export {
            dirs.push(self.export_dir());
        }
        dirs.into_iter().unique().collect()
    }
}

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant that summarizes articles. Provide a concise summary in the original article's language.";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SummarizationSettings {
    /// Base URL of an OpenAI-compatible API.
    pub api_base: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Total attempts per article, including the first one.
    pub retry_attempts: u32,
    /// Initial backoff in seconds; doubles with each retry.
    pub retry_base_delay: f64,
    pub retry_max_delay: f64,
    /// Calls per minute.
    pub rate_limit: u32,
    pub timeout: u64,
    pub system_prompt: String,
    /// When set, replaces `system_prompt` with the file's contents.
    pub prompt_file: Option<PathBuf>,
    pub max_input_chars: Option<usize>,
}

impl Default for SummarizationSettings {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-4".to_string(),
            max_tokens: 1000,
            temperature: 0.7,
            retry_attempts: 3,
            retry_base_delay: 1.0,
            retry_max_delay: 30.0,
            rate_limit: 50,
            timeout: 60,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            prompt_file: None,
            max_input_chars: None,
        }
    }
}

impl SummarizationSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn base_delay(&self) -> Duration {
        seconds(self.retry_base_delay)
    }

    pub fn max_delay(&self) -> Duration {
        seconds(self.retry_max_delay)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// An `EnvFilter` directive such as `info` or `article_digest=debug`.
    pub level: String,
    /// Log destination; stderr when unset.
    pub file: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl Settings {
    /// Parse settings from YAML text and check value ranges.
    pub fn from_yaml(text: &str, path: &Path) -> Result<Self, ConfigError> {
        // An empty document deserializes to unit, not to a mapping.
        let settings: Settings = if text.trim().is_empty() {
            Settings::default()
        } else {
            serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from `path`, falling back to defaults when it does not exist.
    #[instrument(level = "debug", skip_all, fields(path = %path.display()))]
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => Self::from_yaml(&text, path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Config file not found; using defaults");
                Ok(Settings::default())
            }
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Resolve the system prompt, reading `prompt_file` when configured.
    pub async fn system_prompt(&self) -> Result<String, ConfigError> {
        match &self.summarization.prompt_file {
            Some(path) => {
                let text = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|source| ConfigError::Io {
                        path: path.clone(),
                        source,
                    })?;
                Ok(text.trim().to_string())
            }
            None => Ok(self.summarization.system_prompt.clone()),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.summarization.retry_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "summarization.retry_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.summarization.rate_limit == 0 {
            return Err(ConfigError::Invalid {
                key: "summarization.rate_limit",
                reason: "must be at least 1 call per minute".to_string(),
            });
        }
        for (key, value) in [
            ("scraping.delay_between_requests", self.scraping.delay_between_requests),
            ("summarization.retry_base_delay", self.summarization.retry_base_delay),
            ("summarization.retry_max_delay", self.summarization.retry_max_delay),
        ] {
            Duration::try_from_secs_f64(value).map_err(|e| ConfigError::Invalid {
                key,
                reason: format!("{} is not a usable number of seconds: {}", value, e),
            })?;
        }
        let timestamp_format = &self.output.backup_timestamp_format;
        if StrftimeItems::new(timestamp_format).any(|item| matches!(item, Item::Error)) {
            return Err(ConfigError::Invalid {
                key: "output.backup_timestamp_format",
                reason: format!("`{}` is not a valid strftime format", timestamp_format),
            });
        }
        if self.scraping.content_selectors.is_empty() {
            return Err(ConfigError::Invalid {
                key: "scraping.content_selectors",
                reason: "needs at least one selector".to_string(),
            });
        }
        Ok(())
    }
}

/// Seconds as a `Duration`; negative or NaN is zero, overflow saturates.
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_empty() {
        let settings = Settings::from_yaml("", Path::new("config.yaml")).unwrap();
        assert_eq!(settings.output.store_path(), PathBuf::from("articles/all_summaries.json"));
        assert_eq!(settings.summarization.retry_attempts, 3);
        assert_eq!(settings.output.date_format, DateFormat::Iso);
        assert!(settings.output.backup);
        assert!(settings.feeds.is_empty());
    }

    #[test]
    fn test_partial_yaml_keeps_other_defaults() {
        let yaml = r#"
scraping:
  timeout: 10
  headers:
    User-Agent: test-agent
output:
  directory: out
  date_format: long
  separator: blank
  compress: true
summarization:
  rate_limit: 120
feeds:
  - https://example.com/rss
"#;
        let settings = Settings::from_yaml(yaml, Path::new("config.yaml")).unwrap();
        assert_eq!(settings.scraping.timeout(), Duration::from_secs(10));
        assert_eq!(settings.scraping.headers["User-Agent"], "test-agent");
        assert_eq!(settings.scraping.paragraph_selector, "p");
        assert_eq!(settings.output.date_format, DateFormat::Long);
        assert_eq!(settings.output.separator, Separator::Blank);
        assert!(settings.output.compress);
        assert_eq!(settings.output.export_dir(), PathBuf::from("out/txt_summaries"));
        assert_eq!(settings.output.backup_dir(), PathBuf::from("out"));
        assert_eq!(settings.summarization.rate_limit, 120);
        assert_eq!(settings.summarization.model, "gpt-4");
        assert_eq!(settings.feeds, vec!["https://example.com/rss".to_string()]);
    }

    #[test]
    fn test_rejects_zero_retry_attempts() {
        let yaml = "summarization:\n  retry_attempts: 0\n";
        let err = Settings::from_yaml(yaml, Path::new("config.yaml")).unwrap_err();
        assert!(err.to_string().contains("summarization.retry_attempts"));
    }

    #[test]
    fn test_rejects_unrepresentable_delays() {
        for yaml in [
            "scraping:\n  delay_between_requests: 1.0e20\n",
            "scraping:\n  delay_between_requests: -1\n",
            "summarization:\n  retry_max_delay: 1.0e30\n",
            "summarization:\n  retry_base_delay: .nan\n",
        ] {
            let err = Settings::from_yaml(yaml, Path::new("config.yaml")).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { .. }), "{yaml}: {err}");
        }
    }

    #[test]
    fn test_delay_helpers_never_panic() {
        let mut settings = Settings::default();
        settings.scraping.delay_between_requests = 1.0e20;
        settings.summarization.retry_base_delay = f64::NAN;
        assert_eq!(settings.scraping.delay(), Duration::MAX);
        assert_eq!(settings.summarization.base_delay(), Duration::ZERO);
    }

    #[test]
    fn test_rejects_bad_backup_timestamp_format() {
        let yaml = "output:\n  backup_timestamp_format: \"%Y%m%d_%Q\"\n";
        let err = Settings::from_yaml(yaml, Path::new("config.yaml")).unwrap_err();
        assert!(err.to_string().contains("output.backup_timestamp_format"));

        let yaml = "output:\n  backup_timestamp_format: \"%Y-%m-%d_%H%M\"\n";
        assert!(Settings::from_yaml(yaml, Path::new("config.yaml")).is_ok());
    }

    #[test]
    fn test_writable_dirs() {
        let output = OutputSettings {
            directory: PathBuf::from("out"),
            backup_directory: Some(PathBuf::from("bak")),
            export_directory: Some(PathBuf::from("txt")),
            ..OutputSettings::default()
        };
        assert_eq!(
            output.writable_dirs(true),
            vec![PathBuf::from("out"), PathBuf::from("bak"), PathBuf::from("txt")]
        );
        assert_eq!(
            output.writable_dirs(false),
            vec![PathBuf::from("out"), PathBuf::from("bak")]
        );

        let defaults = OutputSettings {
            backup: false,
            ..OutputSettings::default()
        };
        assert_eq!(
            defaults.writable_dirs(true),
            vec![PathBuf::from("articles"), PathBuf::from("articles/txt_summaries")]
        );
        // Backups default to the store directory, which is listed once.
        assert_eq!(OutputSettings::default().writable_dirs(false), vec![PathBuf::from("articles")]);
    }

    #[test]
    fn test_rejects_unknown_date_format() {
        let yaml = "output:\n  date_format: roman\n";
        assert!(matches!(
            Settings::from_yaml(yaml, Path::new("config.yaml")),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("nope.yaml")).await.unwrap();
        assert_eq!(settings.logging.level, "info");
    }

    #[tokio::test]
    async fn test_prompt_file_overrides_system_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let prompt = dir.path().join("myprompt.txt");
        std::fs::write(&prompt, "  Summarize in three bullet points.\n").unwrap();

        let mut settings = Settings::default();
        assert_eq!(settings.system_prompt().await.unwrap(), DEFAULT_SYSTEM_PROMPT);

        settings.summarization.prompt_file = Some(prompt);
        assert_eq!(
            settings.system_prompt().await.unwrap(),
            "Summarize in three bullet points."
        );
    }
}
