//! The request-dispatch pipeline.
//!
//! # Stages
//! ```text
//! Message
//!     → RequestDescriptor::from_message      (BuildError → Rejected)
//!     → RateLimiter::admit                   (waits, never drops)
//!     → MultipartAssembler::assemble         (AssemblyError → Rejected)
//!     → Dispatcher::dispatch                 (TransportError → Retry)
//!     → RetryPolicy::classify_status         (→ Retry | continue)
//!     → Externalizer                         (write failure → TerminalError)
//!     → Outcome::Completed { output, analytics }
//! ```
//!
//! Every failure becomes a routed message; `process` never returns an error.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::Instrument;
use url::Url;

use crate::analytics::AnalyticsRecord;
use crate::config::{GatewayConfig, ValidationError};
use crate::gateway::outcome::{self, Outcome, ResponseBody};
use crate::gateway::router::{OutcomeRouter, SinkReceivers};
use crate::http::{
    DispatchError, Dispatcher, MultipartAssembler, RequestBody, RequestDescriptor, ReqwestDispatcher,
};
use crate::message::Message;
use crate::observability::metrics;
use crate::resilience::{RateLimitError, RateLimiter, RetryDecision, RetryPolicy};
use crate::storage::{
    DefaultResourceStore, ExternalizePolicy, Externalizer, SharedResourceStore, DEFAULT_CONTENT_TYPE,
};

/// Errors that prevent a gateway from being constructed.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration: {}", join(.0))]
    Config(Vec<ValidationError>),

    #[error(transparent)]
    RateLimit(#[from] RateLimitError),

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("invalid upstream url: {0}")]
    Upstream(#[from] url::ParseError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// One gateway instance: policies plus the collaborators they act through.
#[derive(Debug)]
pub struct Gateway {
    upstream: Option<Url>,
    limiter: RateLimiter,
    assembler: MultipartAssembler,
    dispatcher: Arc<dyn Dispatcher>,
    retry_policy: RetryPolicy,
    externalizer: Externalizer,
    max_in_flight: usize,
    channel_capacity: usize,
}

/// Handles to a gateway running on its own task.
#[derive(Debug)]
pub struct RunningGateway {
    pub input: mpsc::Sender<Message>,
    pub sinks: SinkReceivers,
    pub task: JoinHandle<()>,
}

impl Gateway {
    /// Build a gateway with the default reqwest dispatcher and file/memory store.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, StartupError> {
        let dispatcher = Arc::new(ReqwestDispatcher::new(&config.timeouts)?);
        let store = Arc::new(DefaultResourceStore::new(&config.resource_root));
        Self::new(config, dispatcher, store)
    }

    /// Build a gateway with explicit collaborators.
    pub fn new(
        config: &GatewayConfig,
        dispatcher: Arc<dyn Dispatcher>,
        store: SharedResourceStore,
    ) -> Result<Self, StartupError> {
        crate::config::validation::validate_config(config).map_err(StartupError::Config)?;
        let limiter = RateLimiter::new(config.request_per_second, config.burst_size)?;
        let upstream = config.url.as_deref().map(Url::parse).transpose()?;
        let retry_policy = RetryPolicy::from_config(
            &config.retry_error_status_codes,
            config.retry_url_regex.as_deref(),
        )?;
        let policy = ExternalizePolicy::new(
            config.content_length_to_externalize,
            &config.url_patterns_to_externalize,
            config.resource_location_uri.clone(),
        )?;

        Ok(Self {
            upstream,
            limiter,
            assembler: MultipartAssembler::new(store.clone()),
            dispatcher,
            retry_policy,
            externalizer: Externalizer::new(policy, store),
            max_in_flight: config.max_in_flight.max(1),
            channel_capacity: config.channel_capacity.max(1),
        })
    }

    /// Run one inbound message through the whole pipeline.
    pub async fn process(&self, message: Message) -> Outcome {
        let request = match RequestDescriptor::from_message(&message, self.upstream.as_ref()) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(
                    continuation_id = ?message.continuation_id(),
                    error = %e,
                    "Rejecting malformed request"
                );
                metrics::record_exchange("rejected", None, Duration::ZERO);
                return Outcome::Rejected {
                    output: outcome::rejected_message(&message.headers, None, &e.to_string()),
                };
            }
        };

        let span = tracing::info_span!(
            "exchange",
            continuation_id = %request.correlation_id(),
            method = %request.method(),
            url = %request.url(),
        );
        self.exchange(request, message.payload)
            .instrument(span)
            .await
    }

    async fn exchange(&self, request: RequestDescriptor, payload: bytes::Bytes) -> Outcome {
        self.limiter.admit().await;

        let request = if request.is_multipart() {
            match self.assembler.assemble(&payload).await {
                Ok(form) => request.with_body(RequestBody::Multipart(form)),
                Err(e) => return self.reject(&request, &e.to_string()),
            }
        } else {
            request
        };

        let response = match self.dispatcher.dispatch(&request).await {
            Ok(response) => response,
            Err(DispatchError::Transport(e)) => {
                let decision = self.retry_policy.classify_transport_failure();
                tracing::warn!(error = %e, kind = e.kind(), decision = %decision, "Transport failure");
                metrics::record_exchange(decision.as_str(), None, Duration::ZERO);
                return Outcome::Retry {
                    feedback: outcome::retry_message(&request, payload, None, Some(&e)),
                };
            }
            Err(DispatchError::InvalidRequest(detail)) => return self.reject(&request, &detail),
        };

        let status = response.status_code();
        let decision = self
            .retry_policy
            .classify_status(status, request.url().as_str());
        metrics::record_exchange(decision.as_str(), Some(status), response.elapsed);

        if decision == RetryDecision::RetryableError {
            tracing::info!(status, "Retryable response, signalling retry");
            return Outcome::Retry {
                feedback: outcome::retry_message(&request, payload, Some(status), None),
            };
        }

        let (decision, body) = self.shape_body(&request, &response, decision).await;
        tracing::info!(
            status,
            decision = %decision,
            elapsed_ms = response.elapsed.as_millis() as u64,
            "Exchange completed"
        );

        let analytics = AnalyticsRecord::derive(&request, &response).into_message();
        let output = outcome::output_message(&request, &response, decision, body);
        Outcome::Completed {
            decision,
            output,
            analytics,
        }
    }

    /// Inline or externalize the body. A failed write turns the exchange terminal.
    async fn shape_body(
        &self,
        request: &RequestDescriptor,
        response: &crate::http::ResponseDescriptor,
        decision: RetryDecision,
    ) -> (RetryDecision, ResponseBody) {
        let path = request.target().path();
        if !self
            .externalizer
            .policy()
            .should_externalize(response.body.len(), path)
        {
            return (decision, ResponseBody::Inline(response.body.clone()));
        }

        let content_type = response.content_type().unwrap_or(DEFAULT_CONTENT_TYPE);
        match self
            .externalizer
            .externalize(
                request.target(),
                request.url().as_str(),
                content_type,
                response.body.clone(),
            )
            .await
        {
            Ok(content) => (decision, ResponseBody::Externalized(content)),
            Err(e) => {
                tracing::error!(error = %e, "Externalization failed");
                (
                    RetryDecision::TerminalError,
                    ResponseBody::ExternalizationFailed(e.to_string()),
                )
            }
        }
    }

    fn reject(&self, request: &RequestDescriptor, detail: &str) -> Outcome {
        tracing::warn!(error = %detail, "Request rejected before dispatch");
        metrics::record_exchange("rejected", None, Duration::ZERO);
        Outcome::Rejected {
            output: outcome::rejected_message(
                request.inbound_headers(),
                Some(request.correlation_id()),
                detail,
            ),
        }
    }

    /// Spawn the gateway on its own task with fresh channels.
    pub fn start(self, shutdown: broadcast::Receiver<()>) -> RunningGateway {
        let (input_tx, input_rx) = mpsc::channel(self.channel_capacity);
        let (router, sinks) = OutcomeRouter::channels(self.channel_capacity);
        let gateway = Arc::new(self);
        let task = tokio::spawn(gateway.run(input_rx, router, shutdown));
        RunningGateway {
            input: input_tx,
            sinks,
            task,
        }
    }

    /// Consume inbound messages until the channel closes or shutdown fires.
    ///
    /// Each message is an independent task; at most `maxInFlight` run at
    /// once. In-flight exchanges are drained before returning.
    pub async fn run(
        self: Arc<Self>,
        mut input: mpsc::Receiver<Message>,
        router: OutcomeRouter,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let permits = Arc::new(Semaphore::new(self.max_in_flight));
        let mut tasks = JoinSet::new();

        tracing::info!(
            max_in_flight = self.max_in_flight,
            rate = self.limiter.rate(),
            "Gateway started"
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Gateway received shutdown signal, draining");
                    break;
                }
                received = input.recv() => {
                    let Some(message) = received else {
                        tracing::info!("Input closed, draining");
                        break;
                    };
                    let permit = tokio::select! {
                        _ = shutdown.recv() => {
                            tracing::info!("Gateway received shutdown signal while saturated, draining");
                            break;
                        }
                        acquired = permits.clone().acquire_owned() => match acquired {
                            Ok(permit) => permit,
                            Err(_) => break,
                        },
                    };
                    let gateway = self.clone();
                    let router = router.clone();
                    tasks.spawn(async move {
                        let outcome = gateway.process(message).await;
                        router.route(outcome).await;
                        drop(permit);
                    });
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "Exchange task failed");
                    }
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Exchange task failed");
            }
        }
        tracing::info!("Gateway stopped");
    }
}
