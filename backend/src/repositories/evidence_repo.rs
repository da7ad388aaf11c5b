use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use crate::error::{AppError, Result};
use crate::models::edit_history::{EditHistoryEntry, FieldChange};
use crate::models::evidence::{
    format_evidence_number, BlobPointer, EvidenceItem, MetadataChanges, NewEvidence,
};

/// Column list shared by every query returning an `EvidenceItem`.
const EVIDENCE_COLUMNS: &str = r#"
    id, case_id, evidence_number, evidence_type, title, description, tags,
    is_critical, file_path, file_name, mime_type, file_size, is_encrypted,
    checksum_sha256, collected_by, source, source_person_id,
    collection_location, collected_at, created_by, created_at,
    is_edited, last_edited_by, last_edited_at
"#;

/// Exclusive hold on one evidence item, shared by every process that uses
/// the same repository. Released by `release` or when dropped.
#[async_trait]
pub trait WriteLease: Send {
    async fn release(self: Box<Self>) -> Result<()>;
}

/// Outcome of a pointer move, kept so the move can be undone.
#[derive(Debug, Clone)]
pub struct PointerUpdate {
    pub item: EvidenceItem,
    pub history_id: i64,
}

#[async_trait]
pub trait EvidenceRepository: Send + Sync {
    /// Insert a new item, allocating the next evidence number of its case.
    async fn create(&self, new: NewEvidence) -> Result<EvidenceItem>;

    async fn find(&self, id: i64) -> Result<Option<EvidenceItem>>;

    async fn list_by_case(&self, case_id: i64) -> Result<Vec<EvidenceItem>>;

    /// Wait for the item's write lease. Writers hold it from loading the
    /// item until their last change is stored.
    async fn lock_for_write(&self, id: i64) -> Result<Box<dyn WriteLease>>;

    /// Move the live pointer off `expected_path`, recording `change` in
    /// the edit history and marking the item edited. Fails with
    /// `Conflict` when the item no longer points at `expected_path`.
    async fn update_pointer(
        &self,
        id: i64,
        expected_path: &str,
        pointer: &BlobPointer,
        change: &FieldChange,
        edited_by: i64,
        edited_at: DateTime<Utc>,
    ) -> Result<PointerUpdate>;

    /// Undo `update`: pointer, edited flag and last-edit stamp are taken
    /// back from `prior` and the history entry it wrote is removed.
    async fn revert_pointer(&self, prior: &EvidenceItem, update: &PointerUpdate) -> Result<()>;

    /// Apply metadata changes and their history entries atomically.
    async fn apply_edits(
        &self,
        id: i64,
        changes: &MetadataChanges,
        history: &[FieldChange],
        edited_by: i64,
        edited_at: DateTime<Utc>,
    ) -> Result<EvidenceItem>;

    /// Remove the item together with its versions and edit history.
    /// Returns false when no such item existed.
    async fn delete(&self, id: i64) -> Result<bool>;

    async fn edit_history(&self, id: i64) -> Result<Vec<EditHistoryEntry>>;

    /// Storage keys referenced by live pointers and version rows.
    async fn referenced_blob_paths(&self) -> Result<Vec<String>>;
}

pub struct SqlxEvidenceRepository {
    pool: PgPool,
}

impl SqlxEvidenceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Holds a transaction-scoped advisory lock keyed by the evidence id.
struct PgWriteLease {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl WriteLease for PgWriteLease {
    async fn release(self: Box<Self>) -> Result<()> {
        // Nothing was written through this transaction
        self.tx.rollback().await?;
        Ok(())
    }
}

async fn insert_history(
    tx: &mut Transaction<'_, Postgres>,
    evidence_id: i64,
    change: &FieldChange,
    edited_by: i64,
    edited_at: DateTime<Utc>,
) -> Result<i64> {
    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO evidence_edit_history
            (evidence_id, field_name, old_value, new_value, edited_by, edited_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id
        "#,
    )
    .bind(evidence_id)
    .bind(change.field_name)
    .bind(&change.old_value)
    .bind(&change.new_value)
    .bind(edited_by)
    .bind(edited_at)
    .fetch_one(&mut **tx)
    .await?;
    Ok(id)
}

fn pointer_mismatch(id: i64, exists: bool) -> AppError {
    if exists {
        AppError::Conflict(format!("Evidence {} was changed by another writer", id))
    } else {
        AppError::NotFound(format!("Evidence {} not found", id))
    }
}

#[async_trait]
impl EvidenceRepository for SqlxEvidenceRepository {
    async fn create(&self, new: NewEvidence) -> Result<EvidenceItem> {
        let mut tx = self.pool.begin().await?;

        let sequence: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO evidence_number_sequences (case_id, last_value)
            VALUES ($1, 1)
            ON CONFLICT (case_id) DO UPDATE
                SET last_value = evidence_number_sequences.last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(new.case_id)
        .fetch_one(&mut *tx)
        .await?;

        let item = sqlx::query_as::<_, EvidenceItem>(&format!(
            r#"
            INSERT INTO evidence_items (
                case_id, evidence_number, evidence_type, title, description, tags,
                is_critical, file_path, file_name, mime_type, file_size, is_encrypted,
                checksum_sha256, collected_by, source, source_person_id,
                collection_location, collected_at, created_by, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, true,
                    $12, $13, $14, $15, $16, $17, $18, $19)
            RETURNING {}
            "#,
            EVIDENCE_COLUMNS
        ))
        .bind(new.case_id)
        .bind(format_evidence_number(new.case_id, sequence))
        .bind(new.evidence_type)
        .bind(&new.title)
        .bind(&new.description)
        .bind(&new.tags)
        .bind(new.is_critical)
        .bind(&new.pointer.path)
        .bind(&new.pointer.file_name)
        .bind(&new.pointer.mime_type)
        .bind(new.pointer.size)
        .bind(&new.pointer.checksum_sha256)
        .bind(new.collected_by)
        .bind(&new.source)
        .bind(new.source_person_id)
        .bind(&new.collection_location)
        .bind(new.collected_at)
        .bind(new.created_by)
        .bind(new.created_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(item)
    }

    async fn find(&self, id: i64) -> Result<Option<EvidenceItem>> {
        let item = sqlx::query_as::<_, EvidenceItem>(&format!(
            "SELECT {} FROM evidence_items WHERE id = $1",
            EVIDENCE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(item)
    }

    async fn list_by_case(&self, case_id: i64) -> Result<Vec<EvidenceItem>> {
        let items = sqlx::query_as::<_, EvidenceItem>(&format!(
            "SELECT {} FROM evidence_items WHERE case_id = $1 ORDER BY id",
            EVIDENCE_COLUMNS
        ))
        .bind(case_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    async fn lock_for_write(&self, id: i64) -> Result<Box<dyn WriteLease>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        Ok(Box::new(PgWriteLease { tx }))
    }

    async fn update_pointer(
        &self,
        id: i64,
        expected_path: &str,
        pointer: &BlobPointer,
        change: &FieldChange,
        edited_by: i64,
        edited_at: DateTime<Utc>,
    ) -> Result<PointerUpdate> {
        let mut tx = self.pool.begin().await?;

        let item = sqlx::query_as::<_, EvidenceItem>(&format!(
            r#"
            UPDATE evidence_items SET
                file_path = $3,
                file_name = $4,
                mime_type = $5,
                file_size = $6,
                checksum_sha256 = $7,
                is_edited = true,
                last_edited_by = $8,
                last_edited_at = $9
            WHERE id = $1 AND file_path = $2
            RETURNING {}
            "#,
            EVIDENCE_COLUMNS
        ))
        .bind(id)
        .bind(expected_path)
        .bind(&pointer.path)
        .bind(&pointer.file_name)
        .bind(&pointer.mime_type)
        .bind(pointer.size)
        .bind(&pointer.checksum_sha256)
        .bind(edited_by)
        .bind(edited_at)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(item) = item else {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM evidence_items WHERE id = $1)")
                    .bind(id)
                    .fetch_one(&mut *tx)
                    .await?;
            return Err(pointer_mismatch(id, exists));
        };

        let history_id = insert_history(&mut tx, id, change, edited_by, edited_at).await?;

        tx.commit().await?;
        Ok(PointerUpdate { item, history_id })
    }

    async fn revert_pointer(&self, prior: &EvidenceItem, update: &PointerUpdate) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE evidence_items SET
                file_path = $3,
                file_name = $4,
                mime_type = $5,
                file_size = $6,
                checksum_sha256 = $7,
                is_edited = $8,
                last_edited_by = $9,
                last_edited_at = $10
            WHERE id = $1 AND file_path = $2
            "#,
        )
        .bind(prior.id)
        .bind(&update.item.file_path)
        .bind(&prior.file_path)
        .bind(&prior.file_name)
        .bind(&prior.mime_type)
        .bind(prior.file_size)
        .bind(&prior.checksum_sha256)
        .bind(prior.is_edited)
        .bind(prior.last_edited_by)
        .bind(prior.last_edited_at)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(pointer_mismatch(prior.id, true));
        }

        sqlx::query("DELETE FROM evidence_edit_history WHERE id = $1 AND evidence_id = $2")
            .bind(update.history_id)
            .bind(prior.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn apply_edits(
        &self,
        id: i64,
        changes: &MetadataChanges,
        history: &[FieldChange],
        edited_by: i64,
        edited_at: DateTime<Utc>,
    ) -> Result<EvidenceItem> {
        let mut tx = self.pool.begin().await?;

        let item = sqlx::query_as::<_, EvidenceItem>(&format!(
            r#"
            UPDATE evidence_items SET
                title = COALESCE($2, title),
                description = COALESCE($3, description),
                evidence_type = COALESCE($4, evidence_type),
                collection_location = COALESCE($5, collection_location),
                is_critical = COALESCE($6, is_critical),
                tags = COALESCE($7, tags),
                is_edited = true,
                last_edited_by = $8,
                last_edited_at = $9
            WHERE id = $1
            RETURNING {}
            "#,
            EVIDENCE_COLUMNS
        ))
        .bind(id)
        .bind(&changes.title)
        .bind(&changes.description)
        .bind(changes.evidence_type)
        .bind(&changes.collection_location)
        .bind(changes.is_critical)
        .bind(&changes.tags)
        .bind(edited_by)
        .bind(edited_at)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Evidence {} not found", id)))?;

        for change in history {
            insert_history(&mut tx, id, change, edited_by, edited_at).await?;
        }

        tx.commit().await?;
        Ok(item)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        // Versions and edit history cascade; custody rows have no FK and stay
        let result = sqlx::query("DELETE FROM evidence_items WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn edit_history(&self, id: i64) -> Result<Vec<EditHistoryEntry>> {
        let entries = sqlx::query_as::<_, EditHistoryEntry>(
            r#"
            SELECT id, evidence_id, field_name, old_value, new_value, edited_by, edited_at
            FROM evidence_edit_history
            WHERE evidence_id = $1
            ORDER BY id
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    async fn referenced_blob_paths(&self) -> Result<Vec<String>> {
        let paths = sqlx::query_scalar::<_, String>(
            r#"
            SELECT file_path FROM evidence_items
            UNION
            SELECT file_path FROM evidence_versions
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(paths)
    }
}
