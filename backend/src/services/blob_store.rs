//! Encrypted blob store - facade over a storage backend.
//!
//! Every blob is encrypted before it reaches the backend and decrypted
//! after it leaves it. Callers only ever see plaintext and storage keys.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Datelike, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::Result;
use crate::services::encryption::EvidenceCipher;
use crate::storage::path_format::{live_key, version_key, EVIDENCE_ROOT};
use crate::storage::StorageBackend;

/// Result of storing a plaintext blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub key: String,
    /// Plaintext size in bytes.
    pub size: i64,
    /// Hex SHA-256 of the plaintext.
    pub checksum_sha256: String,
}

/// Where the bytes of a retained version come from.
#[derive(Debug, Clone, Copy)]
pub enum VersionSource<'a> {
    /// Encrypt these bytes.
    Plaintext(&'a [u8]),
    /// Copy an already encrypted blob verbatim.
    Encrypted(&'a str),
}

/// Blob store facade
pub struct BlobStore {
    backend: Arc<dyn StorageBackend>,
    cipher: EvidenceCipher,
}

impl BlobStore {
    pub fn new(backend: Arc<dyn StorageBackend>, cipher: EvidenceCipher) -> Self {
        Self { backend, cipher }
    }

    /// Calculate SHA-256 hash of content
    pub fn calculate_hash(content: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content);
        format!("{:x}", hasher.finalize())
    }

    /// Encrypt and store a new live blob in the case partition of the
    /// current year. The key is unique per call.
    pub async fn put(&self, case_id: i64, plaintext: &[u8]) -> Result<StoredBlob> {
        let key = live_key(case_id, Utc::now().year(), Uuid::new_v4());
        let sealed = self.cipher.seal(plaintext)?;
        self.backend.put(&key, Bytes::from(sealed)).await?;

        tracing::debug!(case_id, size = plaintext.len(), "Stored evidence blob");

        Ok(StoredBlob {
            key,
            size: plaintext.len() as i64,
            checksum_sha256: Self::calculate_hash(plaintext),
        })
    }

    /// Store a version blob in the evidence partition and return its key.
    pub async fn put_version(
        &self,
        evidence_id: i64,
        version_number: i32,
        source: VersionSource<'_>,
    ) -> Result<String> {
        let key = version_key(evidence_id, version_number, Uuid::new_v4());
        match source {
            VersionSource::Plaintext(plaintext) => {
                let sealed = self.cipher.seal(plaintext)?;
                self.backend.put(&key, Bytes::from(sealed)).await?;
            }
            VersionSource::Encrypted(existing) => {
                self.backend.copy(existing, &key).await?;
            }
        }

        tracing::debug!(evidence_id, version_number, "Stored version blob");
        Ok(key)
    }

    /// Read and decrypt a blob.
    pub async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let sealed = self.backend.get(key).await?;
        Ok(self.cipher.open(&sealed)?)
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        self.backend.exists(key).await
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        self.backend.delete(key).await
    }

    pub async fn modified(&self, key: &str) -> Result<DateTime<Utc>> {
        self.backend.modified(key).await
    }

    /// Every key below the evidence root, including in-flight temp files.
    pub async fn list_keys(&self) -> Result<Vec<String>> {
        self.backend.list(EVIDENCE_ROOT).await
    }
}
