//! Chain-of-custody model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Kind of possession event recorded in the custody log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CustodyAction {
    Collected,
    Stored,
    Transferred,
    Analyzed,
    Accessed,
    Returned,
    Disposed,
}

impl CustodyAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            CustodyAction::Collected => "collected",
            CustodyAction::Stored => "stored",
            CustodyAction::Transferred => "transferred",
            CustodyAction::Analyzed => "analyzed",
            CustodyAction::Accessed => "accessed",
            CustodyAction::Returned => "returned",
            CustodyAction::Disposed => "disposed",
        }
    }
}

/// One immutable custody log entry
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CustodyEvent {
    pub id: i64,
    pub evidence_id: i64,
    pub action: CustodyAction,
    pub actor_id: i64,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub witness_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Custody event ready to be appended
#[derive(Debug, Clone)]
pub struct NewCustodyEvent {
    pub evidence_id: i64,
    pub action: CustodyAction,
    pub actor_id: i64,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub witness_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}
