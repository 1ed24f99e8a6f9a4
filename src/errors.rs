//! Typed errors for fetching, extraction, configuration, storage, and runs.
//!
//! Per-competitor errors ([`FetchError`], [`ParseError`], wrapped in
//! [`ScrapeError`]) are recovered locally and recorded in the run's failure
//! list. [`ConfigError`] and [`RunError`] are the only run-level failures.

use std::fmt;
use thiserror::Error;

/// Errors produced while fetching a page.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The request did not complete within the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// The server answered with a non-2xx status.
    #[error("HTTP status {0}")]
    HttpStatus(u16),

    /// Connection, TLS, DNS, or body decoding failure.
    #[error("transport error: {0}")]
    Transport(String),
}

impl FetchError {
    /// Whether the error is worth retrying (timeouts and 5xx only).
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout => true,
            FetchError::HttpStatus(code) => (500..600).contains(code),
            FetchError::Transport(_) => false,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = e.status() {
            FetchError::HttpStatus(status.as_u16())
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}

/// Errors produced while extracting records from HTML.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The item selector matched zero elements; the site layout has
    /// probably changed and the selector is stale.
    #[error("selector `{selector}` matched no elements")]
    NoMatch { selector: String },

    /// Elements matched but could not be turned into records.
    #[error("malformed page: {0}")]
    Malformed(String),
}

/// Invalid or unreadable configuration. Aborts the run before any fetch.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("no competitors configured")]
    Empty,

    #[error("competitor #{index} ({name:?}): {reason}")]
    InvalidEntry {
        index: usize,
        name: String,
        reason: String,
    },

    #[error("competitor {0:?} is configured more than once")]
    Duplicate(String),

    #[error("invalid option `{option}`: {reason}")]
    InvalidOption {
        option: &'static str,
        reason: String,
    },
}

/// Why one competitor could not be updated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The overall run deadline passed before this competitor finished.
    #[error("run deadline exceeded")]
    Deadline,
}

impl ScrapeError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ScrapeError::Fetch(FetchError::Timeout) | ScrapeError::Deadline => FailureKind::Timeout,
            ScrapeError::Fetch(FetchError::HttpStatus(code)) => FailureKind::HttpStatus(*code),
            ScrapeError::Fetch(FetchError::Transport(_)) => FailureKind::Transport,
            ScrapeError::Parse(ParseError::NoMatch { .. }) => FailureKind::NoMatch,
            ScrapeError::Parse(ParseError::Malformed(_)) => FailureKind::Malformed,
        }
    }
}

/// Coarse error category shown in the report's "could not update" section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Timeout,
    HttpStatus(u16),
    Transport,
    NoMatch,
    Malformed,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Timeout => write!(f, "Timeout"),
            FailureKind::HttpStatus(code) => write!(f, "HTTPStatus({code})"),
            FailureKind::Transport => write!(f, "Transport"),
            FailureKind::NoMatch => write!(f, "NoMatch"),
            FailureKind::Malformed => write!(f, "Malformed"),
        }
    }
}

/// Snapshot storage failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("snapshot I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt snapshot {path}: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Run-level failures that require a non-zero exit.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("run timed out after {elapsed_secs}s with no competitor updated")]
    TimedOut { elapsed_secs: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(FetchError::Timeout.is_transient());
        assert!(FetchError::HttpStatus(503).is_transient());
        assert!(!FetchError::HttpStatus(404).is_transient());
        assert!(!FetchError::HttpStatus(429).is_transient());
        assert!(!FetchError::Transport("reset".into()).is_transient());
    }

    #[test]
    fn test_failure_kinds() {
        assert_eq!(ScrapeError::Deadline.kind(), FailureKind::Timeout);
        assert_eq!(
            ScrapeError::from(FetchError::HttpStatus(502)).kind(),
            FailureKind::HttpStatus(502)
        );
        let no_match = ParseError::NoMatch {
            selector: "article".into(),
        };
        assert_eq!(ScrapeError::from(no_match).kind(), FailureKind::NoMatch);
        assert_eq!(FailureKind::HttpStatus(404).to_string(), "HTTPStatus(404)");
    }
}
