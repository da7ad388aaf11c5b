//! Evidence registry service.
//!
//! Orchestrates the blob store, version ledger, custody log and access
//! guard. Every operation that touches a blob records exactly one custody
//! event after the blob operation succeeded and before returning. When
//! that append fails the operation is undone where possible and reported
//! as `CustodyLogFailure`.
//!
//! Operations on one evidence item are serialized through a per-item
//! read/write lock: downloads share it, replace/edit/delete hold it
//! exclusively. Writers additionally take the repository's write lease,
//! which serializes them across every instance sharing the database.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

use crate::config::EvidencePolicy;
use crate::error::{AppError, Result};
use crate::models::actor::Actor;
use crate::models::custody::{CustodyAction, CustodyEvent};
use crate::models::edit_history::{EditHistoryEntry, FieldChange};
use crate::models::evidence::{
    BlobPointer, EvidenceItem, EvidenceMetadata, EvidenceType, MetadataChanges, NewEvidence,
};
use crate::models::version::EvidenceVersion;
use crate::repositories::{CustodyRepository, EvidenceRepository, VersionRepository};
use crate::services::access_guard::{AccessGuard, EvidenceOperation};
use crate::services::blob_store::BlobStore;
use crate::services::custody_log::{CustodyEntry, CustodyLog};
use crate::services::version_ledger::VersionLedger;
use crate::storage::StorageError;

/// Longest accepted title.
pub const MAX_TITLE_LEN: usize = 255;

/// An uploaded file as received from the client.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub file_name: String,
    pub mime_type: String,
    pub content: Bytes,
}

/// Decrypted evidence content handed back to a caller.
pub struct EvidenceFile {
    pub file_name: String,
    pub mime_type: String,
    pub content: Vec<u8>,
    /// Set when the content comes from a retained version.
    pub version: Option<i32>,
}

redacted_debug!(EvidenceFile {
    show file_name,
    show mime_type,
    redact content,
    show version,
});

/// Item metadata together with its chain of custody.
#[derive(Debug, Clone, Serialize)]
pub struct EvidenceDetail {
    #[serde(flatten)]
    pub item: EvidenceItem,
    pub custody_log: Vec<CustodyEvent>,
}

/// Evidence registry service
pub struct EvidenceService {
    evidence: Arc<dyn EvidenceRepository>,
    blobs: Arc<BlobStore>,
    ledger: VersionLedger,
    custody: CustodyLog,
    guard: Arc<AccessGuard>,
    policy: EvidencePolicy,
    locks: Mutex<HashMap<i64, Arc<RwLock<()>>>>,
}

impl EvidenceService {
    pub fn new(
        evidence: Arc<dyn EvidenceRepository>,
        versions: Arc<dyn VersionRepository>,
        custody: Arc<dyn CustodyRepository>,
        guard: Arc<AccessGuard>,
        blobs: Arc<BlobStore>,
        policy: EvidencePolicy,
    ) -> Self {
        Self {
            ledger: VersionLedger::new(versions, blobs.clone()),
            custody: CustodyLog::new(custody),
            evidence,
            blobs,
            guard,
            policy,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &EvidencePolicy {
        &self.policy
    }

    /// Store a new evidence file for a case.
    pub async fn upload(
        &self,
        case_id: i64,
        metadata: EvidenceMetadata,
        file: FileUpload,
        actor: Actor,
    ) -> Result<EvidenceItem> {
        self.guard
            .authorize(actor, case_id, EvidenceOperation::Upload)
            .await?;

        let title = validate_title(&metadata.title)?;
        let file_name = self.validate_file(metadata.evidence_type, &file)?;

        let stored = self
            .within_deadline("upload", self.blobs.put(case_id, &file.content))
            .await?;

        let now = Utc::now();
        let new = NewEvidence {
            case_id,
            evidence_type: metadata.evidence_type,
            title,
            description: metadata.description,
            tags: normalize_tags(metadata.tags),
            is_critical: metadata.is_critical,
            pointer: BlobPointer {
                path: stored.key.clone(),
                file_name: file_name.clone(),
                mime_type: file.mime_type.clone(),
                size: stored.size,
                checksum_sha256: stored.checksum_sha256,
            },
            collected_by: metadata.collected_by.unwrap_or(actor.id),
            source: metadata.source,
            source_person_id: metadata.source_person_id,
            collection_location: metadata.collection_location.clone(),
            collected_at: metadata.collected_at.unwrap_or(now),
            created_by: actor.id,
            created_at: now,
        };

        let item = match self.evidence.create(new).await {
            Ok(item) => item,
            Err(e) => {
                self.remove_blob(&stored.key).await;
                return Err(e);
            }
        };

        let entry = CustodyEntry::new(item.id, CustodyAction::Collected, actor)
            .maybe_location(metadata.collection_location)
            .notes(format!("Uploaded {}", file_name));
        if let Err(e) = self.custody.append(entry).await {
            let rolled_back = self.evidence.delete(item.id).await.is_ok()
                && self.blobs.delete(&stored.key).await.is_ok();
            return Err(custody_failure(item.id, "upload", rolled_back, &e));
        }

        tracing::info!(
            evidence_id = item.id,
            case_id,
            evidence_number = %item.evidence_number,
            size = item.file_size,
            "Evidence uploaded"
        );
        Ok(item)
    }

    /// Replace the file of an item, retaining the previous one as a version.
    ///
    /// Steps run strictly in order: authorize, snapshot the current blob,
    /// store the new blob, move the pointer, record custody, and only then
    /// delete the old live blob. Until the last step two readable copies
    /// exist.
    pub async fn replace_file(
        &self,
        evidence_id: i64,
        file: FileUpload,
        note: Option<String>,
        actor: Actor,
    ) -> Result<EvidenceItem> {
        self.exclusive(evidence_id, self.replace_held(evidence_id, file, note, actor))
            .await
    }

    async fn replace_held(
        &self,
        evidence_id: i64,
        file: FileUpload,
        note: Option<String>,
        actor: Actor,
    ) -> Result<EvidenceItem> {
        let item = self.load(evidence_id).await?;
        self.guard
            .authorize(actor, item.case_id, EvidenceOperation::Replace)
            .await?;
        let file_name = self.validate_file(item.evidence_type, &file)?;

        let old = item.pointer();
        let now = Utc::now();
        let note = note
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("Replaced by {}", file_name));

        let version = self
            .ledger
            .snapshot(evidence_id, &old, Some(note), actor.id, now)
            .await?;

        let stored = match self
            .within_deadline("replace", self.blobs.put(item.case_id, &file.content))
            .await
        {
            Ok(stored) => stored,
            Err(e) => {
                self.discard_version(&version).await;
                return Err(e);
            }
        };

        let new = BlobPointer {
            path: stored.key.clone(),
            file_name: file_name.clone(),
            mime_type: file.mime_type.clone(),
            size: stored.size,
            checksum_sha256: stored.checksum_sha256,
        };
        let change = FieldChange {
            field_name: "file_name",
            old_value: Some(old.file_name.clone()),
            new_value: Some(file_name.clone()),
        };

        let update = match self
            .evidence
            .update_pointer(evidence_id, &old.path, &new, &change, actor.id, now)
            .await
        {
            Ok(update) => update,
            Err(e) => {
                self.remove_blob(&stored.key).await;
                self.discard_version(&version).await;
                return Err(e);
            }
        };

        let entry = CustodyEntry::new(evidence_id, CustodyAction::Analyzed, actor).notes(format!(
            "File replaced: {} -> {} (version {} retained)",
            old.file_name, file_name, version.version_number
        ));
        if let Err(e) = self.custody.append(entry).await {
            let rolled_back = self.evidence.revert_pointer(&item, &update).await.is_ok()
                && self.blobs.delete(&stored.key).await.is_ok()
                && self.ledger.discard(&version).await.is_ok();
            return Err(custody_failure(evidence_id, "replace", rolled_back, &e));
        }

        // The old blob is retained under the version key from here on
        self.remove_blob(&old.path).await;

        tracing::info!(
            evidence_id,
            version = version.version_number,
            "Evidence file replaced"
        );
        Ok(update.item)
    }

    /// Change allow-listed metadata fields, recording one history entry
    /// per field whose value actually changes.
    pub async fn edit_metadata(
        &self,
        evidence_id: i64,
        changes: MetadataChanges,
        actor: Actor,
    ) -> Result<EvidenceItem> {
        if changes.is_empty() {
            return Err(AppError::NoOp("No editable fields supplied".into()));
        }
        self.exclusive(evidence_id, self.edit_held(evidence_id, changes, actor))
            .await
    }

    async fn edit_held(
        &self,
        evidence_id: i64,
        changes: MetadataChanges,
        actor: Actor,
    ) -> Result<EvidenceItem> {
        let item = self.load(evidence_id).await?;
        self.guard
            .authorize(actor, item.case_id, EvidenceOperation::Edit)
            .await?;

        let (effective, history) = diff_metadata(&item, changes)?;
        if history.is_empty() {
            return Err(AppError::NoOp(
                "Supplied values match the current metadata".into(),
            ));
        }

        let updated = self
            .evidence
            .apply_edits(evidence_id, &effective, &history, actor.id, Utc::now())
            .await?;

        tracing::info!(
            evidence_id,
            fields = history.len(),
            actor_id = actor.id,
            "Evidence metadata edited"
        );
        Ok(updated)
    }

    /// Decrypt and return the live file.
    pub async fn download(&self, evidence_id: i64, actor: Actor) -> Result<EvidenceFile> {
        self.shared(evidence_id, self.download_held(evidence_id, actor))
            .await
    }

    async fn download_held(&self, evidence_id: i64, actor: Actor) -> Result<EvidenceFile> {
        let item = self.load(evidence_id).await?;
        self.guard
            .authorize(actor, item.case_id, EvidenceOperation::Download)
            .await?;

        let content = self
            .within_deadline("download", self.blobs.get(&item.file_path))
            .await
            .map_err(|e| {
                tracing::error!(evidence_id, key = %item.file_path, "Evidence read failed: {}", e);
                e
            })?;
        verify_checksum(evidence_id, &item.file_path, &content, &item.checksum_sha256)?;

        let entry = CustodyEntry::new(evidence_id, CustodyAction::Accessed, actor)
            .notes(format!("Downloaded {}", item.file_name));
        if let Err(e) = self.custody.append(entry).await {
            // Nothing was released to the caller yet
            return Err(custody_failure(evidence_id, "download", true, &e));
        }

        Ok(EvidenceFile {
            file_name: item.file_name,
            mime_type: item.mime_type,
            content,
            version: None,
        })
    }

    /// Decrypt and return a retained version.
    pub async fn download_version(
        &self,
        evidence_id: i64,
        version_number: i32,
        actor: Actor,
    ) -> Result<EvidenceFile> {
        self.shared(
            evidence_id,
            self.download_version_held(evidence_id, version_number, actor),
        )
        .await
    }

    async fn download_version_held(
        &self,
        evidence_id: i64,
        version_number: i32,
        actor: Actor,
    ) -> Result<EvidenceFile> {
        let item = self.load(evidence_id).await?;
        self.guard
            .authorize(actor, item.case_id, EvidenceOperation::Download)
            .await?;

        let (version, content) = self
            .within_deadline(
                "version download",
                self.ledger.read(evidence_id, version_number),
            )
            .await?;
        verify_checksum(
            evidence_id,
            &version.file_path,
            &content,
            &version.checksum_sha256,
        )?;

        let entry = CustodyEntry::new(evidence_id, CustodyAction::Accessed, actor).notes(format!(
            "Downloaded version {} ({})",
            version_number, version.file_name
        ));
        if let Err(e) = self.custody.append(entry).await {
            return Err(custody_failure(evidence_id, "download_version", true, &e));
        }

        Ok(EvidenceFile {
            file_name: version.file_name,
            mime_type: version.mime_type,
            content,
            version: Some(version_number),
        })
    }

    /// Dispose of an item. Administrators only.
    ///
    /// The `disposed` event is written before anything is removed. The
    /// custody log outlives the item.
    pub async fn delete(&self, evidence_id: i64, actor: Actor) -> Result<()> {
        self.exclusive(evidence_id, self.delete_held(evidence_id, actor))
            .await
    }

    async fn delete_held(&self, evidence_id: i64, actor: Actor) -> Result<()> {
        let item = self.load(evidence_id).await?;
        self.guard
            .authorize(actor, item.case_id, EvidenceOperation::Delete)
            .await?;

        let versions = self.ledger.list_versions(evidence_id).await?;

        let entry = CustodyEntry::new(evidence_id, CustodyAction::Disposed, actor).notes(format!(
            "Evidence {} disposed ({}, {} retained versions)",
            item.evidence_number,
            item.file_name,
            versions.len()
        ));
        if let Err(e) = self.custody.append(entry).await {
            return Err(custody_failure(evidence_id, "delete", true, &e));
        }

        if let Err(e) = self.evidence.delete(evidence_id).await {
            tracing::error!(
                target: "custody_reconciliation",
                evidence_id,
                operation = "delete",
                error = %e,
                "Disposal recorded but the evidence row could not be removed"
            );
            return Err(e);
        }

        self.remove_blob(&item.file_path).await;
        for version in &versions {
            self.remove_blob(&version.file_path).await;
        }

        tracing::info!(
            evidence_id,
            case_id = item.case_id,
            evidence_number = %item.evidence_number,
            actor_id = actor.id,
            "Evidence disposed"
        );
        Ok(())
    }

    /// Record a custody event that involves no file operation.
    pub async fn add_custody_entry(
        &self,
        evidence_id: i64,
        action: CustodyAction,
        actor: Actor,
        location: String,
        notes: Option<String>,
        witness_id: Option<i64>,
    ) -> Result<CustodyEvent> {
        if action == CustodyAction::Disposed {
            return Err(AppError::Validation(
                "Disposal is recorded by deleting the evidence item".into(),
            ));
        }
        let location = location.trim();
        if location.is_empty() {
            return Err(AppError::Validation("Location is required".into()));
        }

        let item = self.load(evidence_id).await?;
        self.guard
            .authorize(actor, item.case_id, EvidenceOperation::AddCustody)
            .await?;

        self.custody
            .append(
                CustodyEntry::new(evidence_id, action, actor)
                    .location(location)
                    .maybe_notes(notes.filter(|n| !n.trim().is_empty()))
                    .maybe_witness(witness_id),
            )
            .await
    }

    /// Item metadata with its custody log.
    pub async fn get(&self, evidence_id: i64, actor: Actor) -> Result<EvidenceDetail> {
        let item = self.load(evidence_id).await?;
        self.guard
            .authorize(actor, item.case_id, EvidenceOperation::Read)
            .await?;
        let custody_log = self.custody.history(evidence_id).await?;
        Ok(EvidenceDetail { item, custody_log })
    }

    pub async fn list_by_case(&self, case_id: i64, actor: Actor) -> Result<Vec<EvidenceItem>> {
        self.guard
            .authorize(actor, case_id, EvidenceOperation::Read)
            .await?;
        self.evidence.list_by_case(case_id).await
    }

    pub async fn list_versions(
        &self,
        evidence_id: i64,
        actor: Actor,
    ) -> Result<Vec<EvidenceVersion>> {
        let item = self.load(evidence_id).await?;
        self.guard
            .authorize(actor, item.case_id, EvidenceOperation::Read)
            .await?;
        self.ledger.list_versions(evidence_id).await
    }

    /// Metadata edit history, oldest first.
    pub async fn history(&self, evidence_id: i64, actor: Actor) -> Result<Vec<EditHistoryEntry>> {
        let item = self.load(evidence_id).await?;
        self.guard
            .authorize(actor, item.case_id, EvidenceOperation::Read)
            .await?;
        self.evidence.edit_history(evidence_id).await
    }

    pub async fn custody_log(&self, evidence_id: i64, actor: Actor) -> Result<Vec<CustodyEvent>> {
        let item = self.load(evidence_id).await?;
        self.guard
            .authorize(actor, item.case_id, EvidenceOperation::Read)
            .await?;
        self.custody.history(evidence_id).await
    }

    async fn load(&self, evidence_id: i64) -> Result<EvidenceItem> {
        self.evidence
            .find(evidence_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Evidence {} not found", evidence_id)))
    }

    async fn item_lock(&self, evidence_id: i64) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(evidence_id)
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    /// Drop the map entry once no other task holds or waits on it. An
    /// entry left behind by a cancelled operation goes with the next
    /// release on that item.
    async fn release_lock(&self, evidence_id: i64, lock: Arc<RwLock<()>>) {
        let mut locks = self.locks.lock().await;
        let current = locks
            .get(&evidence_id)
            .is_some_and(|entry| Arc::ptr_eq(entry, &lock));
        // One reference lives in the map, the other is `lock`
        if current && Arc::strong_count(&lock) == 2 {
            locks.remove(&evidence_id);
        }
    }

    /// Run `op` holding the item exclusively: the local write lock first,
    /// then the repository's write lease.
    async fn exclusive<T>(
        &self,
        evidence_id: i64,
        op: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let lock = self.item_lock(evidence_id).await;
        let result = {
            let _local = lock.write().await;
            match self
                .within_deadline("lock", self.evidence.lock_for_write(evidence_id))
                .await
            {
                Ok(lease) => {
                    let result = op.await;
                    if let Err(e) = lease.release().await {
                        tracing::warn!(evidence_id, "Failed to release write lease: {}", e);
                    }
                    result
                }
                Err(e) => Err(e),
            }
        };
        self.release_lock(evidence_id, lock).await;
        result
    }

    /// Run `op` under the shared side of the local item lock.
    async fn shared<T>(&self, evidence_id: i64, op: impl Future<Output = Result<T>>) -> Result<T> {
        let lock = self.item_lock(evidence_id).await;
        let result = {
            let _local = lock.read().await;
            op.await
        };
        self.release_lock(evidence_id, lock).await;
        result
    }

    /// Check size, MIME type and file name; returns the cleaned file name.
    fn validate_file(&self, evidence_type: EvidenceType, file: &FileUpload) -> Result<String> {
        let file_name = sanitize_file_name(&file.file_name)
            .ok_or_else(|| AppError::Validation("File name is required".into()))?;

        if file.content.is_empty() {
            return Err(AppError::Validation("File is empty".into()));
        }
        if file.content.len() as u64 > self.policy.max_upload_bytes {
            return Err(AppError::Validation(format!(
                "File exceeds the maximum size of {} bytes",
                self.policy.max_upload_bytes
            )));
        }
        if !self.policy.is_mime_allowed(evidence_type, &file.mime_type) {
            return Err(AppError::Validation(format!(
                "MIME type '{}' is not allowed for {} evidence",
                file.mime_type,
                evidence_type.as_str()
            )));
        }
        Ok(file_name)
    }

    async fn within_deadline<T>(
        &self,
        operation: &str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.policy.deadline, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    operation,
                    deadline_secs = self.policy.deadline.as_secs(),
                    "Evidence operation timed out"
                );
                Err(AppError::DeadlineExceeded(format!(
                    "Evidence {} did not complete in time",
                    operation
                )))
            }
        }
    }

    async fn remove_blob(&self, key: &str) {
        if let Err(e) = self.blobs.delete(key).await {
            tracing::warn!(key = %key, "Failed to remove evidence blob: {}", e);
        }
    }

    async fn discard_version(&self, version: &EvidenceVersion) {
        if let Err(e) = self.ledger.discard(version).await {
            tracing::warn!(
                evidence_id = version.evidence_id,
                version = version.version_number,
                "Failed to discard version of an aborted replacement: {}",
                e
            );
        }
    }
}

fn custody_failure(
    evidence_id: i64,
    operation: &str,
    rolled_back: bool,
    cause: &AppError,
) -> AppError {
    if rolled_back {
        tracing::error!(
            evidence_id,
            operation,
            error = %cause,
            "Custody append failed, operation rolled back"
        );
    } else {
        tracing::error!(
            target: "custody_reconciliation",
            evidence_id,
            operation,
            error = %cause,
            "Custody append failed and rollback did not complete, manual reconciliation required"
        );
    }
    AppError::CustodyLogFailure {
        evidence_id,
        rolled_back,
    }
}

fn verify_checksum(evidence_id: i64, key: &str, content: &[u8], expected: &str) -> Result<()> {
    let actual = BlobStore::calculate_hash(content);
    if !actual.eq_ignore_ascii_case(expected) {
        tracing::error!(
            evidence_id,
            key = %key,
            expected = %expected,
            actual = %actual,
            "Evidence checksum mismatch"
        );
        return Err(StorageError::ChecksumMismatch(key.to_string()).into());
    }
    Ok(())
}

fn validate_title(title: &str) -> Result<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::Validation("Title is required".into()));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(AppError::Validation(format!(
            "Title must be at most {} characters",
            MAX_TITLE_LEN
        )));
    }
    Ok(title.to_string())
}

fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}

/// Keep only the final path component of a client-supplied name.
fn sanitize_file_name(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    if base.is_empty() || base == "." || base == ".." {
        None
    } else {
        Some(base.to_string())
    }
}

/// Reduce a change request to the fields that differ from `item`.
fn diff_metadata(
    item: &EvidenceItem,
    changes: MetadataChanges,
) -> Result<(MetadataChanges, Vec<FieldChange>)> {
    let mut effective = MetadataChanges::default();
    let mut history = Vec::new();

    if let Some(title) = changes.title {
        let title = validate_title(&title)?;
        if title != item.title {
            history.push(FieldChange {
                field_name: "title",
                old_value: Some(item.title.clone()),
                new_value: Some(title.clone()),
            });
            effective.title = Some(title);
        }
    }
    if let Some(description) = changes.description {
        if item.description.as_deref() != Some(description.as_str()) {
            history.push(FieldChange {
                field_name: "description",
                old_value: item.description.clone(),
                new_value: Some(description.clone()),
            });
            effective.description = Some(description);
        }
    }
    if let Some(evidence_type) = changes.evidence_type {
        if evidence_type != item.evidence_type {
            history.push(FieldChange {
                field_name: "evidence_type",
                old_value: Some(item.evidence_type.as_str().to_string()),
                new_value: Some(evidence_type.as_str().to_string()),
            });
            effective.evidence_type = Some(evidence_type);
        }
    }
    if let Some(location) = changes.collection_location {
        if item.collection_location.as_deref() != Some(location.as_str()) {
            history.push(FieldChange {
                field_name: "collection_location",
                old_value: item.collection_location.clone(),
                new_value: Some(location.clone()),
            });
            effective.collection_location = Some(location);
        }
    }
    if let Some(is_critical) = changes.is_critical {
        if is_critical != item.is_critical {
            history.push(FieldChange {
                field_name: "is_critical",
                old_value: Some(item.is_critical.to_string()),
                new_value: Some(is_critical.to_string()),
            });
            effective.is_critical = Some(is_critical);
        }
    }
    if let Some(tags) = changes.tags {
        let tags = normalize_tags(tags);
        if tags != item.tags {
            history.push(FieldChange {
                field_name: "tags",
                old_value: Some(item.tags.join(", ")),
                new_value: Some(tags.join(", ")),
            });
            effective.tags = Some(tags);
        }
    }

    Ok((effective, history))
}
