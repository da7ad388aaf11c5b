//! Storage backends for encrypted evidence blobs.

pub mod filesystem;
pub mod path_format;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::error::Result;

/// Blob storage failures. Messages carry the storage key and are only
/// meant for server-side logs.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("blob not found: {0}")]
    Missing(String),

    #[error("invalid storage key: {0}")]
    InvalidKey(String),

    #[error("I/O failure on {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("checksum mismatch for {0}")]
    ChecksumMismatch(String),
}

impl StorageError {
    pub(crate) fn io(key: &str, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            StorageError::Missing(key.to_string())
        } else {
            StorageError::Io {
                key: key.to_string(),
                source,
            }
        }
    }
}

/// Storage backend trait
///
/// Keys are relative, `/`-separated paths. A `put` or `copy` is atomic:
/// readers observe either no blob or the complete blob at the key.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Store content under the given key
    async fn put(&self, key: &str, content: Bytes) -> Result<()>;

    /// Retrieve content by key
    async fn get(&self, key: &str) -> Result<Bytes>;

    /// Check if key exists
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Delete content by key
    async fn delete(&self, key: &str) -> Result<()>;

    /// Copy stored bytes to another key without interpreting them
    async fn copy(&self, source: &str, dest: &str) -> Result<()>;

    /// List keys under a prefix
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// When the blob at `key` was last written
    async fn modified(&self, key: &str) -> Result<DateTime<Utc>>;
}
