//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request:
//!     → rate_limit.rs (wait for an admission slot)
//!     → dispatch
//!     → retries.rs (classify: success / retryable / terminal)
//! ```
//!
//! # Design Decisions
//! - Excess demand is delayed, never dropped
//! - Limiter state is per gateway instance, injected rather than global
//! - Retryable outcomes are signalled downstream, not retried here

pub mod rate_limit;
pub mod retries;

pub use rate_limit::{RateLimitError, RateLimiter};
pub use retries::{RetryDecision, RetryPolicy};
