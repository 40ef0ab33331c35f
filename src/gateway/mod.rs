//! Gateway pipeline subsystem.
//!
//! # Data Flow
//! ```text
//! input channel
//!     → pipeline.rs (admit, assemble, dispatch, classify, externalize)
//!     → outcome.rs (Outcome + outbound messages)
//!     → router.rs (output / retry_feedback / analytics channels)
//! ```
//!
//! # Design Decisions
//! - One task per inbound message; completions are unordered
//! - Correlation id is the only link between input and outputs
//! - In-flight work is bounded by a semaphore, admission by the rate limiter

pub mod outcome;
pub mod pipeline;
pub mod router;

pub use outcome::{Outcome, ResponseBody};
pub use pipeline::{Gateway, RunningGateway, StartupError};
pub use router::{OutcomeRouter, Sink, SinkReceivers};
