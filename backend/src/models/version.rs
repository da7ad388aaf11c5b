//! Evidence version model.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use crate::models::evidence::BlobPointer;

/// A superseded evidence file, kept for audit and comparison.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct EvidenceVersion {
    pub id: i64,
    pub evidence_id: i64,
    pub version_number: i32,
    pub file_name: String,
    #[serde(skip_serializing)]
    pub file_path: String,
    pub mime_type: String,
    pub file_size: i64,
    pub checksum_sha256: String,
    pub note: Option<String>,
    pub replaced_by: i64,
    pub replaced_at: DateTime<Utc>,
}

impl EvidenceVersion {
    pub fn pointer(&self) -> BlobPointer {
        BlobPointer {
            path: self.file_path.clone(),
            file_name: self.file_name.clone(),
            mime_type: self.mime_type.clone(),
            size: self.file_size,
            checksum_sha256: self.checksum_sha256.clone(),
        }
    }
}

/// Row data for a new version.
#[derive(Debug, Clone)]
pub struct NewVersion {
    pub evidence_id: i64,
    pub version_number: i32,
    /// Snapshot of the pointer that was live before the replacement, with
    /// `path` rewritten to the copy in the versions area.
    pub pointer: BlobPointer,
    pub note: Option<String>,
    pub replaced_by: i64,
    pub replaced_at: DateTime<Utc>,
}
