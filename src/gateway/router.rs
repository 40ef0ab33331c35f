//! Outcome routing.
//!
//! # Routing Table
//! ```text
//! Completed (success / terminal) → output + analytics
//! Retry                          → retry_feedback
//! Rejected                       → output
//! ```

use tokio::sync::mpsc;

use crate::gateway::outcome::Outcome;
use crate::message::Message;
use crate::observability::metrics;

/// Downstream destinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sink {
    Output,
    RetryFeedback,
    Analytics,
}

impl Sink {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sink::Output => "output",
            Sink::RetryFeedback => "retry_feedback",
            Sink::Analytics => "analytics",
        }
    }
}

impl std::fmt::Display for Sink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pure routing decision: which messages go to which sink.
pub fn deliveries(outcome: Outcome) -> Vec<(Sink, Message)> {
    match outcome {
        Outcome::Completed {
            output, analytics, ..
        } => vec![(Sink::Output, output), (Sink::Analytics, analytics)],
        Outcome::Retry { feedback } => vec![(Sink::RetryFeedback, feedback)],
        Outcome::Rejected { output } => vec![(Sink::Output, output)],
    }
}

/// Sends routed messages into the sink channels.
#[derive(Debug, Clone)]
pub struct OutcomeRouter {
    output: mpsc::Sender<Message>,
    retry_feedback: mpsc::Sender<Message>,
    analytics: mpsc::Sender<Message>,
}

/// Receiving ends of the sink channels.
#[derive(Debug)]
pub struct SinkReceivers {
    pub output: mpsc::Receiver<Message>,
    pub retry_feedback: mpsc::Receiver<Message>,
    pub analytics: mpsc::Receiver<Message>,
}

impl OutcomeRouter {
    /// Create a router with bounded sink channels of `capacity` each.
    pub fn channels(capacity: usize) -> (Self, SinkReceivers) {
        let (output_tx, output_rx) = mpsc::channel(capacity);
        let (retry_tx, retry_rx) = mpsc::channel(capacity);
        let (analytics_tx, analytics_rx) = mpsc::channel(capacity);
        (
            Self {
                output: output_tx,
                retry_feedback: retry_tx,
                analytics: analytics_tx,
            },
            SinkReceivers {
                output: output_rx,
                retry_feedback: retry_rx,
                analytics: analytics_rx,
            },
        )
    }

    fn sender(&self, sink: Sink) -> &mpsc::Sender<Message> {
        match sink {
            Sink::Output => &self.output,
            Sink::RetryFeedback => &self.retry_feedback,
            Sink::Analytics => &self.analytics,
        }
    }

    /// Deliver every message of `outcome`. Waits when a sink is full.
    pub async fn route(&self, outcome: Outcome) {
        for (sink, message) in deliveries(outcome) {
            let continuation_id = message.continuation_id();
            match self.sender(sink).send(message).await {
                Ok(()) => metrics::record_routed(sink.as_str()),
                Err(_) => tracing::warn!(
                    sink = %sink,
                    continuation_id = ?continuation_id,
                    "Sink closed, dropping message"
                ),
            }
        }
    }
}
