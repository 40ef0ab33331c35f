//! Classified exchange outcomes and the messages they turn into.

use bytes::Bytes;
use reqwest::header::HeaderMap;

use crate::http::{RequestDescriptor, ResponseDescriptor, TransportError};
use crate::message::headers as h;
use crate::message::{Message, MessageHeaders};
use crate::resilience::RetryDecision;
use crate::storage::{ExternalizedContent, DEFAULT_CONTENT_TYPE};

/// Where the response body ends up in the outbound message.
#[derive(Debug, Clone)]
pub enum ResponseBody {
    Inline(Bytes),
    Externalized(ExternalizedContent),
    /// The store write failed; the detail replaces the body.
    ExternalizationFailed(String),
}

/// Final state of one inbound message.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Success or terminal error: one output message and one analytics record.
    Completed {
        decision: RetryDecision,
        output: Message,
        analytics: Message,
    },
    /// Retryable error: only a feedback message.
    Retry { feedback: Message },
    /// Failed before anything was sent upstream: one output message.
    Rejected { output: Message },
}

impl Outcome {
    pub fn decision(&self) -> RetryDecision {
        match self {
            Outcome::Completed { decision, .. } => *decision,
            Outcome::Retry { .. } => RetryDecision::RetryableError,
            Outcome::Rejected { .. } => RetryDecision::TerminalError,
        }
    }
}

fn base_headers(request: &RequestDescriptor) -> MessageHeaders {
    let mut headers = MessageHeaders::new();
    headers.insert(h::CONTINUATION_ID, request.correlation_id());
    headers.insert(h::HTTP_REQUEST_METHOD, request.method().as_str());
    headers.insert(h::HTTP_REQUEST_URL, request.url().as_str());
    headers
}

/// Copy upstream response headers, joining repeated values.
fn mirror_headers(headers: &mut MessageHeaders, upstream: &HeaderMap, skip: &[&str]) {
    for name in upstream.keys() {
        let name_str = name.as_str();
        if headers.contains(name_str) || skip.contains(&name_str) {
            continue;
        }
        let values: Vec<&str> = upstream
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        if !values.is_empty() {
            headers.insert(name_str, values.join(", "));
        }
    }
}

/// Output message for a completed exchange (success or terminal error).
///
/// Error output carries the status and timing only; the reason phrase is
/// reported through analytics.
pub fn output_message(
    request: &RequestDescriptor,
    response: &ResponseDescriptor,
    decision: RetryDecision,
    body: ResponseBody,
) -> Message {
    let mut headers = base_headers(request);
    let upstream_type = response.content_type().unwrap_or(DEFAULT_CONTENT_TYPE);
    let terminal = decision == RetryDecision::TerminalError;

    let mut skip = vec![];
    if terminal {
        headers.insert(h::HTTP_STATUS_CODE, response.status_code());
        headers.insert(h::ERROR_RESPONSE_TIME, response.elapsed.as_millis() as u64);
        skip.push("content-type");
    }

    let payload = match body {
        ResponseBody::Inline(bytes) => {
            if !terminal {
                headers.insert(h::ORIGINAL_CONTENT_TYPE, upstream_type);
            }
            headers.insert(h::CONTENT_TYPE, upstream_type);
            mirror_headers(&mut headers, &response.headers, &skip);
            bytes
        }
        ResponseBody::Externalized(content) => {
            headers.insert(h::ORIGINAL_CONTENT_TYPE, upstream_type);
            headers.insert(h::CONTENT_TYPE, DEFAULT_CONTENT_TYPE);
            skip.push("content-length");
            mirror_headers(&mut headers, &response.headers, &skip);
            Bytes::from(serde_json::to_vec(&content).unwrap_or_default())
        }
        ResponseBody::ExternalizationFailed(detail) => {
            headers.insert(h::CONTENT_TYPE, DEFAULT_CONTENT_TYPE);
            headers.insert(h::EXTERNALIZATION_ERROR, detail.as_str());
            skip.push("content-length");
            mirror_headers(&mut headers, &response.headers, &skip);
            error_payload(request.url().as_str(), &detail)
        }
    };

    Message::new(headers, payload)
}

/// Feedback message for an external retry driver. Carries the original
/// inbound headers and body so the request can be resubmitted as-is.
pub fn retry_message(
    request: &RequestDescriptor,
    original_payload: Bytes,
    status: Option<u16>,
    transport: Option<&TransportError>,
) -> Message {
    let mut headers = request.inbound_headers().clone();
    headers.insert(h::CONTINUATION_ID, request.correlation_id());
    headers.insert(h::HTTP_REQUEST_METHOD, request.method().as_str());
    headers.insert(h::HTTP_REQUEST_URL, request.url().as_str());
    if let Some(status) = status {
        headers.insert(h::HTTP_STATUS_CODE, status);
    }
    if let Some(err) = transport {
        headers.insert(h::TRANSPORT_ERROR, err.to_string());
    }
    Message::new(headers, original_payload)
}

/// Output message for a request that never reached the network.
pub fn rejected_message(inbound: &MessageHeaders, correlation_id: Option<&str>, detail: &str) -> Message {
    let mut headers = MessageHeaders::new();
    for name in [h::CONTINUATION_ID, h::HTTP_REQUEST_METHOD, h::HTTP_REQUEST_URL] {
        if let Some(value) = inbound.get(name) {
            headers.insert(name, value.clone());
        }
    }
    if let Some(id) = correlation_id {
        headers.insert(h::CONTINUATION_ID, id);
    }
    headers.insert(h::ERROR_MESSAGE, detail);
    headers.insert(h::CONTENT_TYPE, DEFAULT_CONTENT_TYPE);

    let url = inbound.get_str(h::HTTP_REQUEST_URL).unwrap_or_default();
    Message::new(headers, error_payload(&url, detail))
}

fn error_payload(url: &str, detail: &str) -> Bytes {
    let body = serde_json::json!({
        "http_requestUrl": url,
        "error": detail,
    });
    Bytes::from(body.to_string())
}
