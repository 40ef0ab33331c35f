//! Analytics records.
//!
//! One header-only record per terminal exchange, derived from the request
//! and the received response. The timestamp is assigned at emission and is
//! not meant to be compared exactly.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::http::{RequestDescriptor, ResponseDescriptor};
use crate::message::headers as h;
use crate::message::{Message, MessageHeaders};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyticsRecord {
    pub request_id: String,
    pub http_method: String,
    pub status_code: u16,
    /// Only set for error statuses.
    pub reason_phrase: Option<String>,
    pub host: String,
    pub path: String,
    pub query: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub response_timestamp: u64,
}

impl AnalyticsRecord {
    pub fn derive(request: &RequestDescriptor, response: &ResponseDescriptor) -> Self {
        let target = request.target();
        let reason_phrase = if response.is_error() {
            response.reason_phrase().map(str::to_string)
        } else {
            None
        };

        Self {
            request_id: request.correlation_id().to_string(),
            http_method: request.method().to_string(),
            status_code: response.status_code(),
            reason_phrase,
            host: target.host_str().unwrap_or_default().to_string(),
            path: target.path().to_string(),
            query: target.query().filter(|q| !q.is_empty()).map(str::to_string),
            response_timestamp: now_millis(),
        }
    }

    pub fn into_message(self) -> Message {
        let mut headers = MessageHeaders::new();
        headers.insert(h::REQUEST_ID, self.request_id);
        headers.insert(h::HTTP_METHOD, self.http_method);
        headers.insert(h::STATUS_CODE, self.status_code);
        headers.insert(h::HOST, self.host);
        headers.insert(h::PATH, self.path);
        if let Some(query) = self.query {
            headers.insert(h::QUERY, query);
        }
        if let Some(reason) = self.reason_phrase {
            headers.insert(h::REASON_PHRASE, reason);
        }
        headers.insert(h::RESPONSE_TIMESTAMP, self.response_timestamp);
        Message::empty(headers)
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
