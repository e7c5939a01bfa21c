//! Durable storage for the persisted feed copy.

use std::io::ErrorKind;
use std::path::Path;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use crate::error::{FxError, FxResult};

/// Blob store keyed by a cache identifier.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Read the bytes stored under `id`. Fails with `MissingCache` if absent.
    async fn read(&self, id: &str) -> FxResult<Vec<u8>>;

    /// Overwrite the bytes stored under `id`.
    async fn write(&self, id: &str, bytes: &[u8]) -> FxResult<()>;
}

/// Stores each cache identifier as a file path.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileCacheStorage;

impl FileCacheStorage {
    /// Create a new file storage.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CacheStorage for FileCacheStorage {
    async fn read(&self, id: &str) -> FxResult<Vec<u8>> {
        match tokio::fs::read(id).await {
            Ok(bytes) => {
                debug!(path = id, bytes = bytes.len(), "Read persisted feed");
                Ok(bytes)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(FxError::MissingCache(format!("no persisted feed at {}", id)))
            }
            Err(e) => Err(FxError::InvalidCache(format!("cannot read {}: {}", id, e))),
        }
    }

    async fn write(&self, id: &str, bytes: &[u8]) -> FxResult<()> {
        if let Some(parent) = Path::new(id).parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| FxError::Storage(format!("cannot create {}: {}", parent.display(), e)))?;
        }

        tokio::fs::write(id, bytes)
            .await
            .map_err(|e| FxError::Storage(format!("cannot write {}: {}", id, e)))?;

        debug!(path = id, bytes = bytes.len(), "Persisted feed");
        Ok(())
    }
}

/// In-process storage for embedded use and tests.
#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    blobs: DashMap<String, Vec<u8>>,
}

impl MemoryCacheStorage {
    /// Create an empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether `id` holds any bytes.
    pub fn contains(&self, id: &str) -> bool {
        self.blobs.contains_key(id)
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn read(&self, id: &str) -> FxResult<Vec<u8>> {
        self.blobs
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| FxError::MissingCache(format!("no persisted feed at {}", id)))
    }

    async fn write(&self, id: &str, bytes: &[u8]) -> FxResult<()> {
        self.blobs.insert(id.to_string(), bytes.to_vec());
        Ok(())
    }
}
