//! Resource locations: where externalized bodies are written and where
//! multipart file parts are read from.
//!
//! URIs understood by the built-in stores:
//! - `file:///abs/path` absolute path
//! - `file://dir/rel/path` path relative to the store root (`dir/rel/path`)
//! - `classpath:name` file under `<root>/resources`
//! - `memory://...` the in-memory store, keyed by the whole URI

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("invalid resource uri '{0}'")]
    InvalidUri(String),

    #[error("unsupported resource scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("resource '{0}' not found")]
    NotFound(String),

    #[error("I/O error on '{uri}': {source}")]
    Io {
        uri: String,
        #[source]
        source: std::io::Error,
    },
}

/// A byte sink/source addressed by URI.
///
/// Writes must be idempotent: writing the same URI twice leaves one complete
/// copy of the last content.
#[async_trait]
pub trait ResourceStore: Send + Sync + std::fmt::Debug {
    async fn read(&self, uri: &str) -> Result<Bytes, ResourceError>;

    async fn write(&self, uri: &str, content: Bytes) -> Result<(), ResourceError>;
}

/// Filesystem-backed store for `file:` and `classpath:` URIs.
#[derive(Debug, Clone)]
pub struct FileResourceStore {
    root: PathBuf,
}

impl FileResourceStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Map a URI onto a filesystem path.
    pub fn resolve(&self, uri: &str) -> Result<PathBuf, ResourceError> {
        if let Some(name) = uri.strip_prefix("classpath:") {
            let name = name.trim_start_matches('/');
            if name.is_empty() {
                return Err(ResourceError::InvalidUri(uri.to_string()));
            }
            return Ok(self.root.join("resources").join(name));
        }

        let url = Url::parse(uri).map_err(|_| ResourceError::InvalidUri(uri.to_string()))?;
        if url.scheme() != "file" {
            return Err(ResourceError::UnsupportedScheme(url.scheme().to_string()));
        }

        match url.host_str() {
            Some(host) if !host.is_empty() && host != "localhost" => {
                // file://tmp/a/b names the relative path tmp/a/b
                let mut path = self.root.join(host);
                for segment in url.path_segments().into_iter().flatten() {
                    if !segment.is_empty() {
                        path.push(segment);
                    }
                }
                Ok(path)
            }
            _ => url
                .to_file_path()
                .map_err(|_| ResourceError::InvalidUri(uri.to_string())),
        }
    }
}

#[async_trait]
impl ResourceStore for FileResourceStore {
    async fn read(&self, uri: &str) -> Result<Bytes, ResourceError> {
        let path = self.resolve(uri)?;
        match tokio::fs::read(&path).await {
            Ok(content) => Ok(Bytes::from(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ResourceError::NotFound(uri.to_string()))
            }
            Err(source) => Err(ResourceError::Io {
                uri: uri.to_string(),
                source,
            }),
        }
    }

    async fn write(&self, uri: &str, content: Bytes) -> Result<(), ResourceError> {
        let path = self.resolve(uri)?;
        let io_err = |source| ResourceError::Io {
            uri: uri.to_string(),
            source,
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        // Write a sibling then rename so concurrent writers of one key never
        // leave a torn file behind.
        let mut tmp = path.clone().into_os_string();
        tmp.push(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));
        let tmp = PathBuf::from(tmp);

        if let Err(e) = tokio::fs::write(&tmp, &content).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_err(e));
        }
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_err(e));
        }

        tracing::debug!(path = %path.display(), bytes = content.len(), "Resource written");
        Ok(())
    }
}

/// Concurrent in-process store, useful as an object-store stand-in.
#[derive(Debug, Clone, Default)]
pub struct InMemoryResourceStore {
    inner: Arc<DashMap<String, Bytes>>,
}

impl InMemoryResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, uri: impl Into<String>, content: impl Into<Bytes>) {
        self.inner.insert(uri.into(), content.into());
    }

    pub fn get(&self, uri: &str) -> Option<Bytes> {
        self.inner.get(uri).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[async_trait]
impl ResourceStore for InMemoryResourceStore {
    async fn read(&self, uri: &str) -> Result<Bytes, ResourceError> {
        self.get(uri)
            .ok_or_else(|| ResourceError::NotFound(uri.to_string()))
    }

    async fn write(&self, uri: &str, content: Bytes) -> Result<(), ResourceError> {
        self.inner.insert(uri.to_string(), content);
        Ok(())
    }
}

/// Routes `memory:` URIs to an in-memory store and everything else to files.
#[derive(Debug, Clone)]
pub struct DefaultResourceStore {
    files: FileResourceStore,
    memory: InMemoryResourceStore,
}

impl DefaultResourceStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            files: FileResourceStore::new(root),
            memory: InMemoryResourceStore::new(),
        }
    }

    pub fn memory(&self) -> &InMemoryResourceStore {
        &self.memory
    }

    fn is_memory(uri: &str) -> bool {
        uri.starts_with("memory:")
    }
}

#[async_trait]
impl ResourceStore for DefaultResourceStore {
    async fn read(&self, uri: &str) -> Result<Bytes, ResourceError> {
        if Self::is_memory(uri) {
            self.memory.read(uri).await
        } else {
            self.files.read(uri).await
        }
    }

    async fn write(&self, uri: &str, content: Bytes) -> Result<(), ResourceError> {
        if Self::is_memory(uri) {
            self.memory.write(uri, content).await
        } else {
            self.files.write(uri, content).await
        }
    }
}

pub type SharedResourceStore = Arc<dyn ResourceStore>;
