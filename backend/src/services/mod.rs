//! Business logic services.

pub mod access_guard;
pub mod blob_store;
pub mod custody_log;
pub mod encryption;
pub mod evidence_service;
pub mod orphan_scan;
pub mod version_ledger;
