//! Competitor configuration and global run options.
//!
//! The file is JSON when its extension is `.json`, YAML otherwise. Loading
//! only deserializes; [`Config::validate`] turns the raw entries into the
//! checked list the run consumes, or a [`ConfigError`] that aborts the run
//! before any request is made.

use crate::errors::ConfigError;
use itertools::Itertools;
use scraper::Selector;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument};
use url::Url;

/// How to find the item elements (one per post) on a competitor's page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectorRule {
    /// Elements carrying a CSS class, e.g. `post-card`.
    Class(String),
    /// The element with a given id; its children are the items.
    Id(String),
    /// Elements with an attribute, optionally with an exact value.
    Attribute {
        name: String,
        #[serde(default)]
        value: Option<String>,
    },
    /// Any CSS selector, e.g. `article` or `div.glue-grid__col`.
    Css(String),
}

impl SelectorRule {
    /// The CSS selector text for this rule.
    pub fn to_css(&self) -> String {
        match self {
            SelectorRule::Class(class) => format!(".{class}"),
            SelectorRule::Id(id) => format!("#{id} > *"),
            SelectorRule::Attribute { name, value: None } => format!("[{name}]"),
            SelectorRule::Attribute {
                name,
                value: Some(value),
            } => format!("[{name}=\"{}\"]", value.replace('"', "\\\"")),
            SelectorRule::Css(css) => css.clone(),
        }
    }

    pub fn compile(&self) -> Result<Selector, String> {
        let css = self.to_css();
        Selector::parse(&css).map_err(|e| format!("bad selector `{css}`: {e}"))
    }
}

fn default_title_selector() -> String {
    "h2, h3".to_string()
}

fn default_date_selector() -> String {
    "time".to_string()
}

fn default_content_selector() -> String {
    "p".to_string()
}

fn default_max_items() -> usize {
    10
}

/// One tracked competitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompetitorConfig {
    pub name: String,
    pub url: String,
    /// One-key map in both formats: `{"class": "post"}` / `class: post`.
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub selector: SelectorRule,
    /// Selector for the title inside an item.
    #[serde(default = "default_title_selector")]
    pub title_selector: String,
    /// Selector for the date inside an item; `datetime` wins over text.
    #[serde(default = "default_date_selector")]
    pub date_selector: String,
    /// Selector for the snippet paragraphs inside an item.
    #[serde(default = "default_content_selector")]
    pub content_selector: String,
    #[serde(default = "default_max_items")]
    pub max_items: usize,
}

impl CompetitorConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>, selector: SelectorRule) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            selector,
            title_selector: default_title_selector(),
            date_selector: default_date_selector(),
            content_selector: default_content_selector(),
            max_items: default_max_items(),
        }
    }

    fn check(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name is empty".into());
        }
        let url = Url::parse(&self.url).map_err(|e| format!("invalid url {:?}: {e}", self.url))?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(format!("url {:?} must be http(s) with a host", self.url));
        }
        if self.max_items == 0 {
            return Err("max_items must be at least 1".into());
        }
        self.selector.compile()?;
        for css in [&self.title_selector, &self.date_selector, &self.content_selector] {
            Selector::parse(css).map_err(|e| format!("bad selector `{css}`: {e}"))?;
        }
        Ok(())
    }
}

fn default_request_timeout() -> u64 {
    30
}

fn default_retry_count() -> usize {
    3
}

fn default_retry_backoff_ms() -> u64 {
    300
}

fn default_rate_limit_delay() -> u64 {
    2
}

fn default_run_timeout() -> u64 {
    300
}

fn default_workers() -> usize {
    4
}

fn default_user_agent() -> String {
    "AI-Competitor-Tracker/1.0".to_string()
}

fn default_report_dir() -> String {
    "reports".to_string()
}

fn default_data_dir() -> String {
    "data/snapshots".to_string()
}

fn default_retain_days() -> u32 {
    30
}

/// The whole configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub competitors: Vec<CompetitorConfig>,
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    #[serde(default = "default_retry_count")]
    pub retry_count: usize,
    /// Linear backoff step in milliseconds.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Minimum seconds between two requests to the same host.
    #[serde(default = "default_rate_limit_delay")]
    pub rate_limit_delay: u64,
    /// Overall run deadline in seconds.
    #[serde(default = "default_run_timeout")]
    pub run_timeout: u64,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_report_dir")]
    pub report_dir: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Snapshots older than this many days are pruned.
    #[serde(default = "default_retain_days")]
    pub retain_days: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            competitors: Vec::new(),
            request_timeout: default_request_timeout(),
            retry_count: default_retry_count(),
            retry_backoff_ms: default_retry_backoff_ms(),
            rate_limit_delay: default_rate_limit_delay(),
            run_timeout: default_run_timeout(),
            workers: default_workers(),
            user_agent: default_user_agent(),
            report_dir: default_report_dir(),
            data_dir: default_data_dir(),
            retain_days: default_retain_days(),
        }
    }
}

/// Options the run itself needs, derived from a validated [`Config`].
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub request_timeout: Duration,
    pub retry_count: usize,
    pub retry_backoff: Duration,
    pub host_interval: Duration,
    pub run_timeout: Duration,
    pub workers: usize,
    pub user_agent: String,
}

impl Default for RunOptions {
    fn default() -> Self {
        Config::default().run_options()
    }
}

impl Config {
    /// Read and deserialize a config file.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let config = if is_json {
            Self::from_json(&text)?
        } else {
            Self::from_yaml(&text)?
        };
        info!(competitors = config.competitors.len(), "Loaded configuration");
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Check every entry and global option.
    pub fn validate(&self) -> Result<Vec<CompetitorConfig>, ConfigError> {
        if self.competitors.is_empty() {
            return Err(ConfigError::Empty);
        }
        for (index, competitor) in self.competitors.iter().enumerate() {
            competitor
                .check()
                .map_err(|reason| ConfigError::InvalidEntry {
                    index,
                    name: competitor.name.clone(),
                    reason,
                })?;
        }
        if let Some(dup) = self
            .competitors
            .iter()
            .map(|c| c.name.trim())
            .duplicates()
            .next()
        {
            return Err(ConfigError::Duplicate(dup.to_string()));
        }
        if self.request_timeout == 0 {
            return Err(ConfigError::InvalidOption {
                option: "request_timeout",
                reason: "must be at least 1 second".into(),
            });
        }
        if self.run_timeout == 0 {
            return Err(ConfigError::InvalidOption {
                option: "run_timeout",
                reason: "must be at least 1 second".into(),
            });
        }
        if self.workers == 0 {
            return Err(ConfigError::InvalidOption {
                option: "workers",
                reason: "must be at least 1".into(),
            });
        }
        Ok(self.competitors.clone())
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            request_timeout: Duration::from_secs(self.request_timeout),
            retry_count: self.retry_count,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            host_interval: Duration::from_secs(self.rate_limit_delay),
            run_timeout: Duration::from_secs(self.run_timeout),
            workers: self.workers,
            user_agent: self.user_agent.clone(),
        }
    }
}
