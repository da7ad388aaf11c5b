//! Storage key layout for evidence blobs.
//!
//! Live blobs are partitioned by year and case, superseded versions by
//! evidence id:
//!
//! - live: `evidence/{year}/case_{case_id}/{uuid}.enc`
//! - version: `evidence/versions/{evidence_id}/v{version}_{uuid}.enc`
//!
//! Every key carries a fresh UUID so a write never lands on a path that
//! is already referenced.

use uuid::Uuid;

/// Top-level prefix of every evidence blob.
pub const EVIDENCE_ROOT: &str = "evidence";

/// Extension of encrypted blobs.
pub const BLOB_EXTENSION: &str = "enc";

/// Key for a new live blob of a case.
pub fn live_key(case_id: i64, year: i32, blob_id: Uuid) -> String {
    format!(
        "{}/{}/case_{}/{}.{}",
        EVIDENCE_ROOT,
        year,
        case_id,
        blob_id.simple(),
        BLOB_EXTENSION
    )
}

/// Key for a retained version of an evidence item.
pub fn version_key(evidence_id: i64, version_number: i32, blob_id: Uuid) -> String {
    format!(
        "{}/versions/{}/v{}_{}.{}",
        EVIDENCE_ROOT,
        evidence_id,
        version_number,
        blob_id.simple(),
        BLOB_EXTENSION
    )
}
