//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files. Keys
//! are camelCase so the option names match the ones the message platform uses
//! (`requestPerSecond`, `retryUrlRegex`, ...).

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Upstream base address. When set, its scheme/host/port replace the ones
    /// of every request URL.
    pub url: Option<String>,

    /// Sustained admission rate (requests per second).
    pub request_per_second: f64,

    /// Token bucket capacity (admissions allowed back-to-back).
    pub burst_size: u32,

    /// Location template with `{key}` and `{extension}` placeholders.
    pub resource_location_uri: String,

    /// Directory relative `file:` and `classpath:` URIs resolve against.
    pub resource_root: String,

    /// Response bodies longer than this many bytes are externalized.
    pub content_length_to_externalize: Option<u64>,

    /// Path patterns (regex, full match) whose responses are always externalized.
    pub url_patterns_to_externalize: Vec<String>,

    /// Status codes eligible for retry-feedback.
    pub retry_error_status_codes: Vec<u16>,

    /// Regex the original request URL must match to be retry eligible.
    /// Unset means every URL is eligible.
    pub retry_url_regex: Option<String>,

    /// Maximum exchanges processed concurrently (backpressure).
    pub max_in_flight: usize,

    /// Capacity of each bounded channel between stages.
    pub channel_capacity: usize,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: None,
            request_per_second: 10.0,
            burst_size: 1,
            resource_location_uri: "file:///tmp/{key}{extension}".to_string(),
            resource_root: ".".to_string(),
            content_length_to_externalize: None,
            url_patterns_to_externalize: Vec::new(),
            retry_error_status_codes: Vec::new(),
            retry_url_regex: None,
            max_in_flight: 256,
            channel_capacity: 1024,
            timeouts: TimeoutConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Timeout configuration for outbound calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
