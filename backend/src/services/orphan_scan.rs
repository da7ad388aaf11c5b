//! Orphaned blob detection.
//!
//! A blob is orphaned when neither a live pointer nor a version row
//! references it. Aborted writes (`*.tmp`) are always orphans. Blobs
//! younger than the grace period are neither: an upload or replacement
//! may still be about to commit the row that references them. Reports
//! carry counts only so storage keys never leave the server.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::models::actor::Actor;
use crate::repositories::EvidenceRepository;
use crate::services::access_guard::{AccessGuard, EvidenceOperation};
use crate::services::blob_store::BlobStore;
use crate::storage::filesystem::TEMP_SUFFIX;
use crate::storage::StorageError;

/// Outcome of a scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrphanReport {
    /// Blobs found under the evidence root.
    pub scanned: usize,
    /// Blobs referenced by an item or a version.
    pub referenced: usize,
    /// Unreferenced blobs, excluding temp files.
    pub orphaned_blobs: usize,
    /// Leftover temp files of aborted writes.
    pub temp_files: usize,
    /// Unreferenced blobs and temp files still inside the grace period.
    pub recent: usize,
}

/// Outcome of a purge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub removed: usize,
    pub failed: usize,
}

pub struct OrphanScanner {
    evidence: Arc<dyn EvidenceRepository>,
    blobs: Arc<BlobStore>,
    guard: Arc<AccessGuard>,
    grace: Duration,
}

impl OrphanScanner {
    pub fn new(
        evidence: Arc<dyn EvidenceRepository>,
        blobs: Arc<BlobStore>,
        guard: Arc<AccessGuard>,
        grace: Duration,
    ) -> Self {
        Self {
            evidence,
            blobs,
            guard,
            grace,
        }
    }

    pub async fn scan(&self, actor: Actor) -> Result<OrphanReport> {
        self.guard
            .authorize_admin(actor, EvidenceOperation::Maintenance)
            .await?;
        let (report, _) = self.find_orphans().await?;
        Ok(report)
    }

    /// Remove every orphan found.
    ///
    /// References are re-read right before deleting, so a blob whose row
    /// was committed during the scan is kept.
    pub async fn purge(&self, actor: Actor) -> Result<PurgeReport> {
        self.guard
            .authorize_admin(actor, EvidenceOperation::Maintenance)
            .await?;
        let (_, orphans) = self.find_orphans().await?;
        let referenced: HashSet<String> =
            self.evidence.referenced_blob_paths().await?.into_iter().collect();

        let mut report = PurgeReport::default();
        for key in orphans.iter().filter(|k| !referenced.contains(*k)) {
            match self.blobs.delete(key).await {
                Ok(()) => report.removed += 1,
                Err(e) => {
                    tracing::warn!(key = %key, "Failed to purge orphaned blob: {}", e);
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            actor_id = actor.id,
            removed = report.removed,
            failed = report.failed,
            "Orphaned evidence blobs purged"
        );
        Ok(report)
    }

    async fn find_orphans(&self) -> Result<(OrphanReport, Vec<String>)> {
        let keys = self.blobs.list_keys().await?;
        let referenced: HashSet<String> =
            self.evidence.referenced_blob_paths().await?.into_iter().collect();

        let mut report = OrphanReport {
            scanned: keys.len(),
            ..OrphanReport::default()
        };
        let mut orphans = Vec::new();
        for key in keys {
            if referenced.contains(&key) {
                report.referenced += 1;
                continue;
            }
            match self.is_recent(&key).await {
                Ok(true) => report.recent += 1,
                Ok(false) if key.ends_with(TEMP_SUFFIX) => {
                    report.temp_files += 1;
                    orphans.push(key);
                }
                Ok(false) => {
                    report.orphaned_blobs += 1;
                    orphans.push(key);
                }
                // Removed since the listing, typically a renamed temp file
                Err(AppError::Storage(StorageError::Missing(_))) => report.scanned -= 1,
                Err(e) => return Err(e),
            }
        }

        tracing::debug!(
            scanned = report.scanned,
            orphaned = report.orphaned_blobs,
            temp_files = report.temp_files,
            recent = report.recent,
            "Evidence storage scanned"
        );
        Ok((report, orphans))
    }

    async fn is_recent(&self, key: &str) -> Result<bool> {
        let modified = self.blobs.modified(key).await?;
        // A timestamp in the future counts as age zero
        let age = (Utc::now() - modified).to_std().unwrap_or_default();
        Ok(age < self.grace)
    }
}
