//! HTTP request/response handling subsystem.
//!
//! # Data Flow
//! ```text
//! inbound Message
//!     → request.rs (RequestDescriptor: method, url, headers, body)
//!     → multipart.rs (rebuild form body when original type was multipart)
//!     → client.rs (Dispatcher: async call, TransportError on failure)
//!     → response.rs (ResponseDescriptor)
//! ```

pub mod client;
pub mod multipart;
pub mod request;
pub mod response;

pub use client::{DispatchError, Dispatcher, ReqwestDispatcher, TransportError};
pub use multipart::{AssemblyError, MultipartAssembler, MultipartBody, MultipartPart};
pub use request::{BuildError, RequestBody, RequestDescriptor};
pub use response::ResponseDescriptor;
