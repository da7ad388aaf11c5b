use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::{AppError, Result};
use crate::models::version::{EvidenceVersion, NewVersion};

const VERSION_COLUMNS: &str = r#"
    id, evidence_id, version_number, file_name, file_path, mime_type,
    file_size, checksum_sha256, note, replaced_by, replaced_at
"#;

#[async_trait]
pub trait VersionRepository: Send + Sync {
    /// Highest version number recorded for the item, if any.
    async fn latest_version(&self, evidence_id: i64) -> Result<Option<i32>>;

    /// Insert a version row. Fails with `AppError::Conflict` when the
    /// version number is already taken for this item.
    async fn insert(&self, new: NewVersion) -> Result<EvidenceVersion>;

    /// All versions of the item, ordered by version number.
    async fn list(&self, evidence_id: i64) -> Result<Vec<EvidenceVersion>>;

    async fn find(&self, evidence_id: i64, version_number: i32)
        -> Result<Option<EvidenceVersion>>;

    /// Drop the row of a replacement that never completed.
    async fn discard(&self, evidence_id: i64, version_number: i32) -> Result<()>;
}

pub struct SqlxVersionRepository {
    pool: PgPool,
}

impl SqlxVersionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VersionRepository for SqlxVersionRepository {
    async fn latest_version(&self, evidence_id: i64) -> Result<Option<i32>> {
        let latest = sqlx::query_scalar::<_, Option<i32>>(
            "SELECT MAX(version_number) FROM evidence_versions WHERE evidence_id = $1",
        )
        .bind(evidence_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(latest)
    }

    async fn insert(&self, new: NewVersion) -> Result<EvidenceVersion> {
        sqlx::query_as::<_, EvidenceVersion>(&format!(
            r#"
            INSERT INTO evidence_versions (
                evidence_id, version_number, file_name, file_path, mime_type,
                file_size, checksum_sha256, note, replaced_by, replaced_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {}
            "#,
            VERSION_COLUMNS
        ))
        .bind(new.evidence_id)
        .bind(new.version_number)
        .bind(&new.pointer.file_name)
        .bind(&new.pointer.path)
        .bind(&new.pointer.mime_type)
        .bind(new.pointer.size)
        .bind(&new.pointer.checksum_sha256)
        .bind(&new.note)
        .bind(new.replaced_by)
        .bind(new.replaced_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => AppError::Conflict(
                format!(
                    "Version {} of evidence {} already exists",
                    new.version_number, new.evidence_id
                ),
            ),
            other => AppError::Database(other),
        })
    }

    async fn list(&self, evidence_id: i64) -> Result<Vec<EvidenceVersion>> {
        let versions = sqlx::query_as::<_, EvidenceVersion>(&format!(
            "SELECT {} FROM evidence_versions WHERE evidence_id = $1 ORDER BY version_number",
            VERSION_COLUMNS
        ))
        .bind(evidence_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(versions)
    }

    async fn find(
        &self,
        evidence_id: i64,
        version_number: i32,
    ) -> Result<Option<EvidenceVersion>> {
        let version = sqlx::query_as::<_, EvidenceVersion>(&format!(
            "SELECT {} FROM evidence_versions WHERE evidence_id = $1 AND version_number = $2",
            VERSION_COLUMNS
        ))
        .bind(evidence_id)
        .bind(version_number)
        .fetch_optional(&self.pool)
        .await?;
        Ok(version)
    }

    async fn discard(&self, evidence_id: i64, version_number: i32) -> Result<()> {
        sqlx::query("DELETE FROM evidence_versions WHERE evidence_id = $1 AND version_number = $2")
            .bind(evidence_id)
            .bind(version_number)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
