//! Metadata edit history model.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// One changed field of an evidence item
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct EditHistoryEntry {
    pub id: i64,
    pub evidence_id: i64,
    pub field_name: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub edited_by: i64,
    pub edited_at: DateTime<Utc>,
}

/// A field change about to be recorded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub field_name: &'static str,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}
