//! Persistence for evidence items, versions, custody events and the
//! case-assignment lookup.
//!
//! Each concern is a trait with a PostgreSQL (`Sqlx*`) implementation;
//! `memory` holds in-process implementations of all of them.

pub mod assignment_repo;
pub mod custody_repo;
pub mod evidence_repo;
pub mod memory;
pub mod version_repo;

pub use assignment_repo::{AssignmentStatus, CaseAssignments, SqlxCaseAssignments};
pub use custody_repo::{CustodyRepository, SqlxCustodyRepository};
pub use evidence_repo::{EvidenceRepository, PointerUpdate, SqlxEvidenceRepository, WriteLease};
pub use memory::{InMemoryCaseAssignments, InMemoryStore};
pub use version_repo::{SqlxVersionRepository, VersionRepository};

use std::sync::Arc;

use sqlx::PgPool;

/// The repository set the evidence services are built from.
#[derive(Clone)]
pub struct Repositories {
    pub evidence: Arc<dyn EvidenceRepository>,
    pub versions: Arc<dyn VersionRepository>,
    pub custody: Arc<dyn CustodyRepository>,
    pub assignments: Arc<dyn CaseAssignments>,
}

impl Repositories {
    /// PostgreSQL-backed repositories sharing one pool.
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            evidence: Arc::new(SqlxEvidenceRepository::new(pool.clone())),
            versions: Arc::new(SqlxVersionRepository::new(pool.clone())),
            custody: Arc::new(SqlxCustodyRepository::new(pool.clone())),
            assignments: Arc::new(SqlxCaseAssignments::new(pool)),
        }
    }

    /// In-process repositories over a single store.
    pub fn in_memory(store: Arc<InMemoryStore>, assignments: InMemoryCaseAssignments) -> Self {
        Self {
            evidence: store.clone(),
            versions: store.clone(),
            custody: store,
            assignments: Arc::new(assignments),
        }
    }
}
