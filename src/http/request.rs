//! Request descriptor construction.
//!
//! # Responsibilities
//! - Extract method, URL, correlation id from the inbound message headers
//! - Rewrite the target onto the configured upstream address
//! - Forward non-control message headers as HTTP headers
//!
//! # Design Decisions
//! - Descriptor is immutable once built; body replacement yields a new value
//! - A missing correlation id is generated rather than rejected, so the
//!   outcome can still be matched in logs

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::http::multipart::{is_multipart, MultipartBody};
use crate::message::headers as h;
use crate::message::{Message, MessageHeaders};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("missing required header '{0}'")]
    MissingHeader(&'static str),

    #[error("invalid HTTP method '{0}'")]
    InvalidMethod(String),

    #[error("invalid request url '{0}': must be an absolute http(s) URL")]
    InvalidUrl(String),
}

/// Outbound request body.
#[derive(Debug, Clone)]
pub enum RequestBody {
    Bytes(Bytes),
    Multipart(MultipartBody),
}

impl RequestBody {
    pub fn len(&self) -> usize {
        match self {
            RequestBody::Bytes(b) => b.len(),
            RequestBody::Multipart(m) => m.content_len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Canonical, validated form of an inbound message.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    correlation_id: String,
    method: Method,
    url: Url,
    target: Url,
    headers: HeaderMap,
    body: RequestBody,
    original_content_type: Option<String>,
    inbound_headers: MessageHeaders,
}

impl RequestDescriptor {
    /// Build a descriptor from an inbound message.
    ///
    /// `upstream`, when given, replaces scheme, host and port of the request URL.
    pub fn from_message(message: &Message, upstream: Option<&Url>) -> Result<Self, BuildError> {
        let headers = &message.headers;

        let correlation_id = headers.get_str(h::CONTINUATION_ID).unwrap_or_else(|| {
            let generated = uuid::Uuid::new_v4().to_string();
            tracing::warn!(continuation_id = %generated, "Inbound message has no correlation id, generated one");
            generated
        });

        let method_raw = headers
            .get_str(h::HTTP_REQUEST_METHOD)
            .ok_or(BuildError::MissingHeader(h::HTTP_REQUEST_METHOD))?;
        let method = Method::from_bytes(method_raw.trim().to_ascii_uppercase().as_bytes())
            .map_err(|_| BuildError::InvalidMethod(method_raw.clone()))?;

        let url_raw = headers
            .get_str(h::HTTP_REQUEST_URL)
            .ok_or(BuildError::MissingHeader(h::HTTP_REQUEST_URL))?;
        let url = Url::parse(&url_raw)
            .ok()
            .filter(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
            .ok_or_else(|| BuildError::InvalidUrl(url_raw.clone()))?;

        let target = match upstream {
            Some(base) => rebase(&url, base).ok_or_else(|| BuildError::InvalidUrl(url_raw.clone()))?,
            None => url.clone(),
        };

        let original_content_type = headers.get_str(h::ORIGINAL_CONTENT_TYPE);
        let multipart = original_content_type.as_deref().map_or(false, is_multipart);

        let mut http_headers = forward_headers(headers);
        if !multipart {
            if let Some(ct) = headers
                .get_str(h::CONTENT_TYPE)
                .and_then(|v| HeaderValue::from_str(&v).ok())
            {
                http_headers.insert(CONTENT_TYPE, ct);
            }
        }

        Ok(Self {
            correlation_id,
            method,
            url,
            target,
            headers: http_headers,
            body: RequestBody::Bytes(message.payload.clone()),
            original_content_type,
            inbound_headers: headers.clone(),
        })
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// URL as received from upstream.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// URL the call is actually sent to.
    pub fn target(&self) -> &Url {
        &self.target
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    /// Headers of the message this descriptor was built from.
    pub fn inbound_headers(&self) -> &MessageHeaders {
        &self.inbound_headers
    }

    pub fn is_multipart(&self) -> bool {
        self.original_content_type.as_deref().map_or(false, is_multipart)
    }

    /// Same request with a different body.
    pub fn with_body(self, body: RequestBody) -> Self {
        Self { body, ..self }
    }
}

/// Move `url` onto the scheme/host/port of `base`, keeping path and query.
pub fn rebase(url: &Url, base: &Url) -> Option<Url> {
    let mut target = url.clone();
    target.set_scheme(base.scheme()).ok()?;
    target.set_host(base.host_str()).ok()?;
    target.set_port(base.port()).ok()?;
    Some(target)
}

fn forward_headers(headers: &MessageHeaders) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in headers.iter() {
        if h::is_control_header(name) {
            continue;
        }
        let text = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => continue,
        };
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&text),
        ) {
            (Ok(name), Ok(value)) => {
                out.append(name, value);
            }
            _ => tracing::trace!(header = %name, "Skipping header not representable in HTTP"),
        }
    }
    out
}
