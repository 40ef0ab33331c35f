//! Outbound HTTP dispatch.
//!
//! # Responsibilities
//! - Issue the request described by a `RequestDescriptor`
//! - Return any received response, whatever its status
//! - Report connection, timeout, TLS and DNS problems as `TransportError`
//!
//! # Design Decisions
//! - A 4xx/5xx is a successful dispatch; classification happens later
//! - The trait is the seam tests use to run the pipeline without a network

use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::TimeoutConfig;
use crate::http::request::{RequestBody, RequestDescriptor};
use crate::http::response::ResponseDescriptor;

/// Failure to obtain a response at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("transport error: {0}")]
    Other(String),
}

impl TransportError {
    pub fn kind(&self) -> &'static str {
        match self {
            TransportError::Connect(_) => "connect",
            TransportError::Timeout(_) => "timeout",
            TransportError::Other(_) => "other",
        }
    }

    fn from_reqwest(err: reqwest::Error) -> Self {
        let detail = error_chain(&err);
        if err.is_timeout() {
            TransportError::Timeout(detail)
        } else if err.is_connect() {
            TransportError::Connect(detail)
        } else {
            TransportError::Other(detail)
        }
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The request could not be constructed; nothing was sent.
    #[error("request rejected before sending: {0}")]
    InvalidRequest(String),
}

#[async_trait]
pub trait Dispatcher: Send + Sync + std::fmt::Debug {
    async fn dispatch(&self, request: &RequestDescriptor) -> Result<ResponseDescriptor, DispatchError>;
}

/// `Dispatcher` backed by a pooled reqwest client.
#[derive(Debug, Clone)]
pub struct ReqwestDispatcher {
    client: Client,
}

impl ReqwestDispatcher {
    pub fn new(timeouts: &TimeoutConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .timeout(Duration::from_secs(timeouts.request_secs))
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Dispatcher for ReqwestDispatcher {
    async fn dispatch(&self, request: &RequestDescriptor) -> Result<ResponseDescriptor, DispatchError> {
        let mut builder = self
            .client
            .request(request.method().clone(), request.target().clone())
            .headers(request.headers().clone());

        builder = match request.body() {
            RequestBody::Bytes(bytes) if bytes.is_empty() => builder,
            RequestBody::Bytes(bytes) => builder.body(bytes.clone()),
            RequestBody::Multipart(form) => builder.multipart(form.to_form()),
        };

        let outbound = builder.build().map_err(|e| {
            if e.is_builder() {
                DispatchError::InvalidRequest(error_chain(&e))
            } else {
                DispatchError::Transport(TransportError::from_reqwest(e))
            }
        })?;

        tracing::debug!(
            continuation_id = %request.correlation_id(),
            method = %request.method(),
            target = %request.target(),
            "Dispatching request"
        );

        let start = Instant::now();
        let response = self
            .client
            .execute(outbound)
            .await
            .map_err(TransportError::from_reqwest)?;

        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = response.bytes().await.map_err(TransportError::from_reqwest)?;

        Ok(ResponseDescriptor {
            status,
            headers,
            body,
            elapsed: start.elapsed(),
            url,
        })
    }
}

/// Flatten an error and its sources into one line.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
