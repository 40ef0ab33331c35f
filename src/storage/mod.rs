//! External content storage.
//!
//! # Data Flow
//! ```text
//! ResponseDescriptor
//!     → externalize.rs (size / path policy → key → uri)
//!     → resource.rs (ResourceStore::write)
//!     → ExternalizedContent replaces the payload
//!
//! Multipart file parts:
//!     → resource.rs (ResourceStore::read)
//! ```

pub mod externalize;
pub mod resource;

pub use externalize::{ExternalizePolicy, ExternalizedContent, Externalizer, DEFAULT_CONTENT_TYPE};
pub use resource::{
    DefaultResourceStore, FileResourceStore, InMemoryResourceStore, ResourceError, ResourceStore,
    SharedResourceStore,
};
