//! API module - HTTP handlers and middleware.

pub mod download_response;
pub mod dto;
pub mod handlers;
pub mod middleware;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;

use crate::config::{Config, EvidencePolicy};
use crate::repositories::Repositories;
use crate::services::access_guard::AccessGuard;
use crate::services::blob_store::BlobStore;
use crate::services::encryption::EvidenceCipher;
use crate::services::evidence_service::EvidenceService;
use crate::services::orphan_scan::OrphanScanner;
use crate::storage::StorageBackend;

/// Application state shared across handlers
pub struct AppState {
    pub config: Config,
    /// Present when running against PostgreSQL; used by health checks.
    pub db: Option<PgPool>,
    pub evidence_service: Arc<EvidenceService>,
    pub orphan_scanner: Arc<OrphanScanner>,
}

impl AppState {
    /// Wire the evidence services over the given repositories and storage.
    pub fn new(config: Config, repos: Repositories, storage: Arc<dyn StorageBackend>) -> Self {
        let cipher = EvidenceCipher::from_secret(&config.encryption_key);
        let blobs = Arc::new(BlobStore::new(storage, cipher));
        let guard = Arc::new(AccessGuard::new(repos.assignments));

        let evidence_service = Arc::new(EvidenceService::new(
            repos.evidence.clone(),
            repos.versions,
            repos.custody,
            guard.clone(),
            blobs.clone(),
            EvidencePolicy::from_config(&config),
        ));
        let orphan_scanner = Arc::new(OrphanScanner::new(
            repos.evidence,
            blobs,
            guard,
            Duration::from_secs(config.orphan_grace_secs),
        ));

        Self {
            config,
            db: None,
            evidence_service,
            orphan_scanner,
        }
    }

    pub fn with_db(mut self, db: PgPool) -> Self {
        self.db = Some(db);
        self
    }
}

pub type SharedState = Arc<AppState>;
