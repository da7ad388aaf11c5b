//! Version ledger - retained copies of superseded evidence files.
//!
//! A snapshot copies the current encrypted blob into the versions area
//! first and records the row second, so a version row never references a
//! blob that was not fully written. Version numbers are allocated as
//! `max + 1` and protected by the unique `(evidence_id, version_number)`
//! constraint; a collision retries with a fresh number.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::{AppError, Result, VersionMissing};
use crate::models::evidence::BlobPointer;
use crate::models::version::{EvidenceVersion, NewVersion};
use crate::repositories::VersionRepository;
use crate::services::blob_store::{BlobStore, VersionSource};
use crate::storage::StorageError;

/// How often `snapshot` retries after losing a version number race.
pub const MAX_SNAPSHOT_ATTEMPTS: usize = 5;

/// Version ledger service
pub struct VersionLedger {
    versions: Arc<dyn VersionRepository>,
    blobs: Arc<BlobStore>,
}

impl VersionLedger {
    pub fn new(versions: Arc<dyn VersionRepository>, blobs: Arc<BlobStore>) -> Self {
        Self { versions, blobs }
    }

    /// Retain the blob `current` points at as the next version of the item.
    pub async fn snapshot(
        &self,
        evidence_id: i64,
        current: &BlobPointer,
        note: Option<String>,
        replaced_by: i64,
        replaced_at: DateTime<Utc>,
    ) -> Result<EvidenceVersion> {
        for attempt in 1..=MAX_SNAPSHOT_ATTEMPTS {
            let next = self.versions.latest_version(evidence_id).await?.unwrap_or(0) + 1;

            let key = self
                .blobs
                .put_version(evidence_id, next, VersionSource::Encrypted(&current.path))
                .await?;

            let new = NewVersion {
                evidence_id,
                version_number: next,
                pointer: BlobPointer {
                    path: key.clone(),
                    ..current.clone()
                },
                note: note.clone(),
                replaced_by,
                replaced_at,
            };

            match self.versions.insert(new).await {
                Ok(version) => {
                    tracing::info!(evidence_id, version = next, "Recorded evidence version");
                    return Ok(version);
                }
                Err(e) => {
                    self.remove_blob(&key).await;
                    match e {
                        AppError::Conflict(_) => {
                            tracing::warn!(
                                evidence_id,
                                version = next,
                                attempt,
                                "Version number taken, retrying"
                            );
                        }
                        other => return Err(other),
                    }
                }
            }
        }

        Err(AppError::Conflict(format!(
            "Could not allocate a version number for evidence {} after {} attempts",
            evidence_id, MAX_SNAPSHOT_ATTEMPTS
        )))
    }

    /// All versions of an item in ascending order.
    pub async fn list_versions(&self, evidence_id: i64) -> Result<Vec<EvidenceVersion>> {
        self.versions.list(evidence_id).await
    }

    /// Look up one version row.
    pub async fn get_version(
        &self,
        evidence_id: i64,
        version_number: i32,
    ) -> Result<EvidenceVersion> {
        self.versions
            .find(evidence_id, version_number)
            .await?
            .ok_or(AppError::VersionNotFound {
                evidence_id,
                version: version_number,
                cause: VersionMissing::RowMissing,
            })
    }

    /// Look up a version and decrypt its blob.
    ///
    /// A row whose blob is gone is reported as `VersionNotFound` with
    /// `BlobMissing`. Other storage and cipher failures pass through.
    pub async fn read(
        &self,
        evidence_id: i64,
        version_number: i32,
    ) -> Result<(EvidenceVersion, Vec<u8>)> {
        let version = self.get_version(evidence_id, version_number).await?;
        let content = self.blobs.get(&version.file_path).await.map_err(|e| match e {
            AppError::Storage(StorageError::Missing(key)) => {
                tracing::error!(
                    evidence_id,
                    version = version_number,
                    key = %key,
                    "Version row references a missing blob"
                );
                AppError::VersionNotFound {
                    evidence_id,
                    version: version_number,
                    cause: VersionMissing::BlobMissing,
                }
            }
            other => other,
        })?;
        Ok((version, content))
    }

    /// Undo a snapshot whose replacement did not complete.
    pub async fn discard(&self, version: &EvidenceVersion) -> Result<()> {
        self.versions
            .discard(version.evidence_id, version.version_number)
            .await?;
        self.blobs.delete(&version.file_path).await
    }

    async fn remove_blob(&self, key: &str) {
        if let Err(e) = self.blobs.delete(key).await {
            tracing::warn!(key = %key, "Failed to remove unreferenced version blob: {}", e);
        }
    }
}
