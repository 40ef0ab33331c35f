//! Header names exchanged with upstream and downstream message consumers.

/// Correlation id, propagated unchanged end-to-end.
pub const CONTINUATION_ID: &str = "continuation_id";
pub const HTTP_REQUEST_METHOD: &str = "http_requestMethod";
pub const HTTP_REQUEST_URL: &str = "http_requestUrl";
pub const HTTP_STATUS_CODE: &str = "http_statusCode";
pub const ORIGINAL_CONTENT_TYPE: &str = "original_content_type";
/// Content type of the message payload itself.
pub const CONTENT_TYPE: &str = "contentType";
pub const ERROR_RESPONSE_TIME: &str = "error_response_time";
pub const ERROR_MESSAGE: &str = "error_message";
pub const TRANSPORT_ERROR: &str = "transport_error";
pub const EXTERNALIZATION_ERROR: &str = "externalization_error";

// Analytics record headers.
pub const REQUEST_ID: &str = "request_id";
pub const HTTP_METHOD: &str = "http_method";
pub const STATUS_CODE: &str = "status_code";
pub const REASON_PHRASE: &str = "reason_phrase";
pub const HOST: &str = "host";
pub const PATH: &str = "path";
pub const QUERY: &str = "query";
pub const RESPONSE_TIMESTAMP: &str = "response_timestamp";

/// Headers that steer the gateway and are never forwarded as HTTP headers.
pub const CONTROL_HEADERS: &[&str] = &[
    CONTINUATION_ID,
    HTTP_REQUEST_METHOD,
    HTTP_REQUEST_URL,
    HTTP_STATUS_CODE,
    ORIGINAL_CONTENT_TYPE,
    CONTENT_TYPE,
    "id",
    "timestamp",
];

pub fn is_control_header(name: &str) -> bool {
    CONTROL_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name))
}
