//! Response body externalization.
//!
//! # Responsibilities
//! - Decide whether a body leaves the message (size threshold or path pattern)
//! - Derive a deterministic storage key and extension
//! - Resolve the location template and write the bytes through a `ResourceStore`
//!
//! # Design Decisions
//! - Either condition is sufficient to externalize
//! - Same (host, path, content type) always resolves to the same URI, so
//!   rewrites overwrite instead of accumulating
//! - Path patterns are regexes matched against the whole path

use bytes::Bytes;
use regex::RegexSet;
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::observability::metrics;
use crate::storage::resource::{ResourceError, SharedResourceStore};

/// Content type assumed when the upstream response does not declare one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// The payload that replaces an externalized body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalizedContent {
    #[serde(rename = "http_requestUrl")]
    pub http_request_url: String,
    pub original_content_type: String,
    pub uri: String,
    pub size: u64,
}

/// When to externalize and where to.
#[derive(Debug, Clone)]
pub struct ExternalizePolicy {
    content_length_threshold: Option<u64>,
    url_patterns: RegexSet,
    location_template: String,
}

impl ExternalizePolicy {
    pub fn new(
        content_length_threshold: Option<u64>,
        url_patterns: &[String],
        location_template: impl Into<String>,
    ) -> Result<Self, regex::Error> {
        let anchored = url_patterns.iter().map(|p| format!("^(?:{})$", p));
        Ok(Self {
            content_length_threshold,
            url_patterns: RegexSet::new(anchored)?,
            location_template: location_template.into(),
        })
    }

    pub fn exceeds_threshold(&self, size: usize) -> bool {
        self.content_length_threshold
            .map_or(false, |limit| size as u64 > limit)
    }

    pub fn matches_path(&self, path: &str) -> bool {
        self.url_patterns.is_match(path)
    }

    pub fn should_externalize(&self, size: usize, path: &str) -> bool {
        self.exceeds_threshold(size) || self.matches_path(path)
    }

    /// Substitute `{key}` and `{extension}` into the location template.
    pub fn resolve_uri(&self, key: &str, extension: &str) -> String {
        self.location_template
            .replace("{key}", key)
            .replace("{extension}", extension)
    }
}

/// Media type without parameters, lowercased.
fn essence(content_type: &str) -> String {
    content_type
        .parse::<mime::Mime>()
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|_| {
            content_type
                .split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        })
}

/// File extension (with leading dot) for a content type.
pub fn extension_for(content_type: &str) -> String {
    let parsed = match content_type.parse::<mime::Mime>() {
        Ok(m) => m,
        Err(_) => return ".bin".to_string(),
    };

    let suffix = parsed.suffix().map(|s| s.as_str().to_ascii_lowercase());
    match suffix.as_deref() {
        Some("json") => return ".json".to_string(),
        Some("xml") => return ".xml".to_string(),
        _ => {}
    }

    let essence = parsed.essence_str().to_ascii_lowercase();
    let ext = match essence.as_str() {
        "application/json" => "json",
        "application/xml" | "text/xml" => "xml",
        "text/plain" => "txt",
        "text/html" => "html",
        "text/csv" => "csv",
        "application/pdf" => "pdf",
        "application/octet-stream" => "bin",
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/gif" => "gif",
        _ => return format!(".{}", parsed.subtype().as_str().to_ascii_lowercase()),
    };
    format!(".{}", ext)
}

/// Storage key `<host>/<path>/<uuid>`; the uuid is name-based over
/// host, path and content type.
pub fn storage_key(host: &str, path: &str, content_type: &str) -> String {
    let name = format!("{}{}{}", host, path, essence(content_type));
    let id = Uuid::new_v3(&Uuid::NAMESPACE_URL, name.as_bytes());

    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        format!("{}/{}", host, id)
    } else {
        format!("{}/{}/{}", host, trimmed, id)
    }
}

/// Applies an `ExternalizePolicy` against a resource store.
#[derive(Debug, Clone)]
pub struct Externalizer {
    policy: ExternalizePolicy,
    store: SharedResourceStore,
}

impl Externalizer {
    pub fn new(policy: ExternalizePolicy, store: SharedResourceStore) -> Self {
        Self { policy, store }
    }

    pub fn policy(&self) -> &ExternalizePolicy {
        &self.policy
    }

    /// Compute where a body for this exchange would be stored.
    pub fn location_for(&self, dispatched_url: &Url, content_type: &str) -> String {
        let host = dispatched_url.host_str().unwrap_or("unknown-host");
        let key = storage_key(host, dispatched_url.path(), content_type);
        self.policy.resolve_uri(&key, &extension_for(content_type))
    }

    /// Write `body` out and describe where it went.
    pub async fn externalize(
        &self,
        dispatched_url: &Url,
        original_url: &str,
        content_type: &str,
        body: Bytes,
    ) -> Result<ExternalizedContent, ResourceError> {
        let uri = self.location_for(dispatched_url, content_type);
        let size = body.len();

        self.store.write(&uri, body).await?;
        metrics::record_externalized(size);
        tracing::debug!(uri = %uri, bytes = size, "Response body externalized");

        Ok(ExternalizedContent {
            http_request_url: original_url.to_string(),
            original_content_type: content_type.to_string(),
            uri,
            size: size as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::resource::{InMemoryResourceStore, ResourceStore};
    use async_trait::async_trait;
    use std::sync::Arc;

    fn policy(threshold: Option<u64>, patterns: &[&str]) -> ExternalizePolicy {
        let patterns: Vec<String> = patterns.iter().map(|p| p.to_string()).collect();
        ExternalizePolicy::new(threshold, &patterns, "file://tmp/{key}{extension}").unwrap()
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let p = policy(Some(1_000_000), &[]);
        assert!(!p.should_externalize(1_000_000, "/post"));
        assert!(p.should_externalize(1_000_001, "/post"));
    }

    #[test]
    fn test_path_pattern_alone_is_sufficient() {
        let p = policy(None, &["/post"]);
        assert!(p.should_externalize(0, "/post"));
        assert!(!p.should_externalize(10, "/post/extra"));
        assert!(!p.should_externalize(10_000_000, "/get"));

        let p = policy(None, &["/files/.*"]);
        assert!(p.should_externalize(1, "/files/a/b"));
    }

    #[test]
    fn test_extensions() {
        assert_eq!(extension_for("application/json"), ".json");
        assert_eq!(extension_for("application/json; charset=utf-8"), ".json");
        assert_eq!(extension_for("application/problem+json"), ".json");
        assert_eq!(extension_for("text/plain"), ".txt");
        assert_eq!(extension_for("application/xml"), ".xml");
        assert_eq!(extension_for("image/jpeg"), ".jpg");
        assert_eq!(extension_for("video/mp4"), ".mp4");
        assert_eq!(extension_for("garbage"), ".bin");
    }

    #[test]
    fn test_key_is_deterministic() {
        let a = storage_key("127.0.0.1", "/post", "application/json");
        let b = storage_key("127.0.0.1", "/post", "application/json; charset=utf-8");
        let c = storage_key("127.0.0.1", "/post", "text/plain");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("127.0.0.1/post/"));
        assert!(storage_key("h", "/", "text/plain").starts_with("h/"));
        assert_eq!(storage_key("h", "/", "text/plain").matches('/').count(), 1);
    }

    #[tokio::test]
    async fn test_externalize_writes_and_describes() {
        let store = InMemoryResourceStore::new();
        let externalizer = Externalizer::new(policy(None, &["/post"]), Arc::new(store.clone()));
        let url = Url::parse("http://127.0.0.1:8080/post").unwrap();

        let first = externalizer
            .externalize(&url, "http://some.domain/post", "application/json", Bytes::from_static(b"{}"))
            .await
            .unwrap();
        let second = externalizer
            .externalize(&url, "http://some.domain/post", "application/json", Bytes::from_static(b"{}"))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert!(first.uri.starts_with("file://tmp/127.0.0.1/post/"));
        assert!(first.uri.ends_with(".json"));
        assert_eq!(first.http_request_url, "http://some.domain/post");
        assert_eq!(first.size, 2);
        assert_eq!(store.len(), 1);
        assert_eq!(&store.get(&first.uri).unwrap()[..], b"{}");

        let json = serde_json::to_value(&first).unwrap();
        assert_eq!(json["http_requestUrl"], "http://some.domain/post");
        assert_eq!(json["original_content_type"], "application/json");
    }

    #[derive(Debug)]
    struct BrokenStore;

    #[async_trait]
    impl ResourceStore for BrokenStore {
        async fn read(&self, uri: &str) -> Result<Bytes, ResourceError> {
            Err(ResourceError::NotFound(uri.to_string()))
        }

        async fn write(&self, uri: &str, _content: Bytes) -> Result<(), ResourceError> {
            Err(ResourceError::Io {
                uri: uri.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            })
        }
    }

    #[tokio::test]
    async fn test_write_failure_surfaces() {
        let externalizer = Externalizer::new(policy(Some(0), &[]), Arc::new(BrokenStore));
        let url = Url::parse("http://h/get").unwrap();
        let err = externalizer
            .externalize(&url, "http://h/get", "text/plain", Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("read-only"));
    }
}
