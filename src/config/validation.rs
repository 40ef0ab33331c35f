//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (rate > 0, status codes in range)
//! - Check that regexes compile and the location template is usable
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use regex::Regex;
use thiserror::Error;
use url::Url;

use crate::config::schema::GatewayConfig;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("requestPerSecond must be a positive number, got {0}")]
    NonPositiveRate(f64),

    #[error("burstSize must be at least 1")]
    ZeroBurst,

    #[error("resourceLocationUri '{0}' has no {{key}} placeholder")]
    MissingKeyPlaceholder(String),

    #[error("{field} is not a valid regex: {reason}")]
    InvalidRegex { field: &'static str, reason: String },

    #[error("retryErrorStatusCodes contains invalid status {0}")]
    InvalidStatusCode(u16),

    #[error("url '{0}' is not an absolute http(s) URL")]
    InvalidUpstreamUrl(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let rate = config.request_per_second;
    if !(rate.is_finite() && rate > 0.0) {
        errors.push(ValidationError::NonPositiveRate(rate));
    }
    if config.burst_size == 0 {
        errors.push(ValidationError::ZeroBurst);
    }
    if !config.resource_location_uri.contains("{key}") {
        errors.push(ValidationError::MissingKeyPlaceholder(
            config.resource_location_uri.clone(),
        ));
    }

    if let Some(pattern) = &config.retry_url_regex {
        if let Err(e) = Regex::new(pattern) {
            errors.push(ValidationError::InvalidRegex {
                field: "retryUrlRegex",
                reason: e.to_string(),
            });
        }
    }
    for pattern in &config.url_patterns_to_externalize {
        if let Err(e) = Regex::new(pattern) {
            errors.push(ValidationError::InvalidRegex {
                field: "urlPatternsToExternalize",
                reason: e.to_string(),
            });
        }
    }

    for &code in &config.retry_error_status_codes {
        if !(100..=599).contains(&code) {
            errors.push(ValidationError::InvalidStatusCode(code));
        }
    }

    if let Some(url) = &config.url {
        let valid = Url::parse(url)
            .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
            .unwrap_or(false);
        if !valid {
            errors.push(ValidationError::InvalidUpstreamUrl(url.clone()));
        }
    }

    if config.max_in_flight == 0 {
        errors.push(ValidationError::Zero("maxInFlight"));
    }
    if config.channel_capacity == 0 {
        errors.push(ValidationError::Zero("channelCapacity"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
