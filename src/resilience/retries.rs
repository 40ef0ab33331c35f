//! Retry classification.
//!
//! # Responsibilities
//! - Classify a completed dispatch as success, retryable or terminal
//! - Gate retryability on the configured status codes AND the URL regex
//!
//! # Design Decisions
//! - Classification only; the gateway never schedules a retry itself
//! - Connection errors always retryable, regardless of URL
//! - An unconfigured URL regex matches every URL
//! - Pure predicates over (status, url) so rules are testable offline

use regex::Regex;
use std::collections::HashSet;

/// Outcome class of a single exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetryDecision {
    Success,
    RetryableError,
    TerminalError,
}

impl RetryDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetryDecision::Success => "success",
            RetryDecision::RetryableError => "retryable",
            RetryDecision::TerminalError => "terminal",
        }
    }
}

impl std::fmt::Display for RetryDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status ranges treated as success.
pub fn is_success_status(status: u16) -> bool {
    (200..400).contains(&status)
}

/// Compiled retry rules.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    status_codes: HashSet<u16>,
    url_regex: Option<Regex>,
}

impl RetryPolicy {
    pub fn new(status_codes: impl IntoIterator<Item = u16>, url_regex: Option<Regex>) -> Self {
        Self {
            status_codes: status_codes.into_iter().collect(),
            url_regex,
        }
    }

    /// Build from raw configuration values.
    pub fn from_config(status_codes: &[u16], url_regex: Option<&str>) -> Result<Self, regex::Error> {
        let url_regex = url_regex.map(Regex::new).transpose()?;
        Ok(Self::new(status_codes.iter().copied(), url_regex))
    }

    pub fn is_retry_status(&self, status: u16) -> bool {
        self.status_codes.contains(&status)
    }

    pub fn is_retry_url(&self, url: &str) -> bool {
        self.url_regex.as_ref().map_or(true, |re| re.is_match(url))
    }

    /// Classify a received HTTP response.
    pub fn classify_status(&self, status: u16, url: &str) -> RetryDecision {
        if is_success_status(status) {
            RetryDecision::Success
        } else if self.is_retry_status(status) && self.is_retry_url(url) {
            RetryDecision::RetryableError
        } else {
            RetryDecision::TerminalError
        }
    }

    /// Classify a transport failure (no response received).
    pub fn classify_transport_failure(&self) -> RetryDecision {
        RetryDecision::RetryableError
    }
}
