//! Evidence item model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;

use crate::error::AppError;

/// Classification of an exhibit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EvidenceType {
    Photo,
    Video,
    Audio,
    Document,
    Physical,
    Digital,
}

impl EvidenceType {
    pub const ALL: [EvidenceType; 6] = [
        EvidenceType::Photo,
        EvidenceType::Video,
        EvidenceType::Audio,
        EvidenceType::Document,
        EvidenceType::Physical,
        EvidenceType::Digital,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceType::Photo => "photo",
            EvidenceType::Video => "video",
            EvidenceType::Audio => "audio",
            EvidenceType::Document => "document",
            EvidenceType::Physical => "physical",
            EvidenceType::Digital => "digital",
        }
    }
}

impl FromStr for EvidenceType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        EvidenceType::ALL
            .into_iter()
            .find(|t| t.as_str() == lower)
            .ok_or_else(|| AppError::Validation(format!("Unknown evidence type: {}", s)))
    }
}

/// Evidence item entity
///
/// The blob pointer columns (`file_path` .. `checksum_sha256`) always
/// describe the current version. `file_path` is a storage key and is
/// never serialized to clients.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct EvidenceItem {
    pub id: i64,
    pub case_id: i64,
    pub evidence_number: String,
    pub evidence_type: EvidenceType,
    pub title: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub is_critical: bool,
    #[serde(skip_serializing)]
    pub file_path: String,
    pub file_name: String,
    pub mime_type: String,
    pub file_size: i64,
    pub is_encrypted: bool,
    pub checksum_sha256: String,
    pub collected_by: i64,
    pub source: Option<String>,
    pub source_person_id: Option<i64>,
    pub collection_location: Option<String>,
    pub collected_at: DateTime<Utc>,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub is_edited: bool,
    pub last_edited_by: Option<i64>,
    pub last_edited_at: Option<DateTime<Utc>>,
}

impl EvidenceItem {
    /// The live blob pointer of this item.
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

/// Location and description of one encrypted blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobPointer {
    pub path: String,
    pub file_name: String,
    pub mime_type: String,
    pub size: i64,
    pub checksum_sha256: String,
}

/// Caller-supplied metadata for a new evidence item.
#[derive(Debug, Clone, Deserialize)]
pub struct EvidenceMetadata {
    pub evidence_type: EvidenceType,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_critical: bool,
    /// Defaults to the uploading actor.
    #[serde(default)]
    pub collected_by: Option<i64>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub source_person_id: Option<i64>,
    #[serde(default)]
    pub collection_location: Option<String>,
    /// Defaults to the upload time.
    #[serde(default)]
    pub collected_at: Option<DateTime<Utc>>,
}

impl EvidenceMetadata {
    pub fn new(evidence_type: EvidenceType, title: impl Into<String>) -> Self {
        Self {
            evidence_type,
            title: title.into(),
            description: None,
            tags: Vec::new(),
            is_critical: false,
            collected_by: None,
            source: None,
            source_person_id: None,
            collection_location: None,
            collected_at: None,
        }
    }
}

/// Row data for inserting an evidence item. The evidence number is
/// allocated by the repository.
#[derive(Debug, Clone)]
pub struct NewEvidence {
    pub case_id: i64,
    pub evidence_type: EvidenceType,
    pub title: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub is_critical: bool,
    pub pointer: BlobPointer,
    pub collected_by: i64,
    pub source: Option<String>,
    pub source_person_id: Option<i64>,
    pub collection_location: Option<String>,
    pub collected_at: DateTime<Utc>,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
}

/// Requested metadata edit. Only these fields are editable; anything
/// else in a request body is dropped during deserialization.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetadataChanges {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub evidence_type: Option<EvidenceType>,
    #[serde(default, alias = "location")]
    pub collection_location: Option<String>,
    #[serde(default, alias = "criticality")]
    pub is_critical: Option<bool>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

impl MetadataChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.evidence_type.is_none()
            && self.collection_location.is_none()
            && self.is_critical.is_none()
            && self.tags.is_none()
    }
}

/// Format a human-readable evidence number.
pub fn format_evidence_number(case_id: i64, sequence: i64) -> String {
    format!("EV-{}-{:04}", case_id, sequence)
}
