//! HTTP client gateway library.
//!
//! Turns message-encoded request descriptors into outbound HTTP calls and the
//! results back into messages, applying rate limiting, retry classification
//! and content externalization on the way.

pub mod analytics;
pub mod config;
pub mod gateway;
pub mod http;
pub mod lifecycle;
pub mod message;
pub mod observability;
pub mod resilience;
pub mod storage;

pub use config::GatewayConfig;
pub use gateway::{Gateway, Outcome, RunningGateway, Sink};
pub use lifecycle::Shutdown;
pub use message::{Message, MessageHeaders};
