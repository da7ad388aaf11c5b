//! In-process repositories.
//!
//! Used by tests and by deployments that run without Postgres. They honor
//! the same contracts as the SQLx repositories: gapless unique version
//! numbers, cascading item deletion and a custody log that survives it.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, Notify};

use crate::error::{AppError, Result};
use crate::models::actor::Role;
use crate::models::custody::{CustodyEvent, NewCustodyEvent};
use crate::models::edit_history::{EditHistoryEntry, FieldChange};
use crate::models::evidence::{
    format_evidence_number, BlobPointer, EvidenceItem, MetadataChanges, NewEvidence,
};
use crate::models::version::{EvidenceVersion, NewVersion};

use super::assignment_repo::{AssignmentStatus, CaseAssignments};
use super::custody_repo::CustodyRepository;
use super::evidence_repo::{EvidenceRepository, PointerUpdate, WriteLease};
use super::version_repo::VersionRepository;

#[derive(Default)]
struct MemoryState {
    items: BTreeMap<i64, EvidenceItem>,
    versions: Vec<EvidenceVersion>,
    custody: Vec<CustodyEvent>,
    history: Vec<EditHistoryEntry>,
    sequences: HashMap<i64, i64>,
    next_item_id: i64,
    next_version_id: i64,
    next_custody_id: i64,
    next_history_id: i64,
}

impl MemoryState {
    fn push_history(
        &mut self,
        evidence_id: i64,
        change: &FieldChange,
        edited_by: i64,
        edited_at: DateTime<Utc>,
    ) -> i64 {
        self.next_history_id += 1;
        self.history.push(EditHistoryEntry {
            id: self.next_history_id,
            evidence_id,
            field_name: change.field_name.to_string(),
            old_value: change.old_value.clone(),
            new_value: change.new_value.clone(),
            edited_by,
            edited_at,
        });
        self.next_history_id
    }
}

/// Ids with an outstanding write lease.
#[derive(Default)]
struct LeaseTable {
    held: StdMutex<HashSet<i64>>,
    released: Notify,
}

impl LeaseTable {
    fn try_take(&self, id: i64) -> bool {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id)
    }

    fn give_back(&self, id: i64) {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        self.released.notify_waiters();
    }
}

struct MemoryLease {
    id: i64,
    table: Arc<LeaseTable>,
}

impl Drop for MemoryLease {
    fn drop(&mut self) {
        self.table.give_back(self.id);
    }
}

#[async_trait]
impl WriteLease for MemoryLease {
    async fn release(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

/// Evidence, version and custody storage held in memory.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<MemoryState>,
    leases: Arc<LeaseTable>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EvidenceRepository for InMemoryStore {
    async fn create(&self, new: NewEvidence) -> Result<EvidenceItem> {
        let mut state = self.state.lock().await;

        let sequence = state.sequences.entry(new.case_id).or_insert(0);
        *sequence += 1;
        let evidence_number = format_evidence_number(new.case_id, *sequence);

        state.next_item_id += 1;
        let item = EvidenceItem {
            id: state.next_item_id,
            case_id: new.case_id,
            evidence_number,
            evidence_type: new.evidence_type,
            title: new.title,
            description: new.description,
            tags: new.tags,
            is_critical: new.is_critical,
            file_path: new.pointer.path,
            file_name: new.pointer.file_name,
            mime_type: new.pointer.mime_type,
            file_size: new.pointer.size,
            is_encrypted: true,
            checksum_sha256: new.pointer.checksum_sha256,
            collected_by: new.collected_by,
            source: new.source,
            source_person_id: new.source_person_id,
            collection_location: new.collection_location,
            collected_at: new.collected_at,
            created_by: new.created_by,
            created_at: new.created_at,
            is_edited: false,
            last_edited_by: None,
            last_edited_at: None,
        };
        state.items.insert(item.id, item.clone());
        Ok(item)
    }

    async fn find(&self, id: i64) -> Result<Option<EvidenceItem>> {
        Ok(self.state.lock().await.items.get(&id).cloned())
    }

    async fn list_by_case(&self, case_id: i64) -> Result<Vec<EvidenceItem>> {
        let state = self.state.lock().await;
        Ok(state
            .items
            .values()
            .filter(|item| item.case_id == case_id)
            .cloned()
            .collect())
    }

    async fn lock_for_write(&self, id: i64) -> Result<Box<dyn WriteLease>> {
        loop {
            // Registered before the check so a release in between is not missed
            let released = self.leases.released.notified();
            if self.leases.try_take(id) {
                return Ok(Box::new(MemoryLease {
                    id,
                    table: self.leases.clone(),
                }));
            }
            released.await;
        }
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
        let mut state = self.state.lock().await;
        let item = state
            .items
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Evidence {} not found", id)))?;
        if item.file_path != expected_path {
            return Err(AppError::Conflict(format!(
                "Evidence {} was changed by another writer",
                id
            )));
        }

        item.file_path = pointer.path.clone();
        item.file_name = pointer.file_name.clone();
        item.mime_type = pointer.mime_type.clone();
        item.file_size = pointer.size;
        item.checksum_sha256 = pointer.checksum_sha256.clone();
        item.is_edited = true;
        item.last_edited_by = Some(edited_by);
        item.last_edited_at = Some(edited_at);
        let item = item.clone();

        let history_id = state.push_history(id, change, edited_by, edited_at);
        Ok(PointerUpdate { item, history_id })
    }

    async fn revert_pointer(&self, prior: &EvidenceItem, update: &PointerUpdate) -> Result<()> {
        let mut state = self.state.lock().await;
        let item = state
            .items
            .get_mut(&prior.id)
            .ok_or_else(|| AppError::NotFound(format!("Evidence {} not found", prior.id)))?;
        if item.file_path != update.item.file_path {
            return Err(AppError::Conflict(format!(
                "Evidence {} was changed by another writer",
                prior.id
            )));
        }

        item.file_path = prior.file_path.clone();
        item.file_name = prior.file_name.clone();
        item.mime_type = prior.mime_type.clone();
        item.file_size = prior.file_size;
        item.checksum_sha256 = prior.checksum_sha256.clone();
        item.is_edited = prior.is_edited;
        item.last_edited_by = prior.last_edited_by;
        item.last_edited_at = prior.last_edited_at;

        state
            .history
            .retain(|h| !(h.id == update.history_id && h.evidence_id == prior.id));
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
        let mut state = self.state.lock().await;
        let item = state
            .items
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Evidence {} not found", id)))?;

        if let Some(title) = &changes.title {
            item.title = title.clone();
        }
        if let Some(description) = &changes.description {
            item.description = Some(description.clone());
        }
        if let Some(evidence_type) = changes.evidence_type {
            item.evidence_type = evidence_type;
        }
        if let Some(location) = &changes.collection_location {
            item.collection_location = Some(location.clone());
        }
        if let Some(is_critical) = changes.is_critical {
            item.is_critical = is_critical;
        }
        if let Some(tags) = &changes.tags {
            item.tags = tags.clone();
        }
        item.is_edited = true;
        item.last_edited_by = Some(edited_by);
        item.last_edited_at = Some(edited_at);
        let updated = item.clone();

        for change in history {
            state.push_history(id, change, edited_by, edited_at);
        }
        Ok(updated)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let mut state = self.state.lock().await;
        if state.items.remove(&id).is_none() {
            return Ok(false);
        }
        state.versions.retain(|v| v.evidence_id != id);
        state.history.retain(|h| h.evidence_id != id);
        Ok(true)
    }

    async fn edit_history(&self, id: i64) -> Result<Vec<EditHistoryEntry>> {
        let state = self.state.lock().await;
        Ok(state
            .history
            .iter()
            .filter(|h| h.evidence_id == id)
            .cloned()
            .collect())
    }

    async fn referenced_blob_paths(&self) -> Result<Vec<String>> {
        let state = self.state.lock().await;
        let paths: HashSet<String> = state
            .items
            .values()
            .map(|item| item.file_path.clone())
            .chain(state.versions.iter().map(|v| v.file_path.clone()))
            .collect();
        Ok(paths.into_iter().collect())
    }
}

#[async_trait]
impl VersionRepository for InMemoryStore {
    async fn latest_version(&self, evidence_id: i64) -> Result<Option<i32>> {
        let state = self.state.lock().await;
        Ok(state
            .versions
            .iter()
            .filter(|v| v.evidence_id == evidence_id)
            .map(|v| v.version_number)
            .max())
    }

    async fn insert(&self, new: NewVersion) -> Result<EvidenceVersion> {
        let mut state = self.state.lock().await;
        let taken = state
            .versions
            .iter()
            .any(|v| v.evidence_id == new.evidence_id && v.version_number == new.version_number);
        if taken {
            return Err(AppError::Conflict(format!(
                "Version {} of evidence {} already exists",
                new.version_number, new.evidence_id
            )));
        }

        state.next_version_id += 1;
        let version = EvidenceVersion {
            id: state.next_version_id,
            evidence_id: new.evidence_id,
            version_number: new.version_number,
            file_name: new.pointer.file_name,
            file_path: new.pointer.path,
            mime_type: new.pointer.mime_type,
            file_size: new.pointer.size,
            checksum_sha256: new.pointer.checksum_sha256,
            note: new.note,
            replaced_by: new.replaced_by,
            replaced_at: new.replaced_at,
        };
        state.versions.push(version.clone());
        Ok(version)
    }

    async fn list(&self, evidence_id: i64) -> Result<Vec<EvidenceVersion>> {
        let state = self.state.lock().await;
        let mut versions: Vec<EvidenceVersion> = state
            .versions
            .iter()
            .filter(|v| v.evidence_id == evidence_id)
            .cloned()
            .collect();
        versions.sort_by_key(|v| v.version_number);
        Ok(versions)
    }

    async fn find(
        &self,
        evidence_id: i64,
        version_number: i32,
    ) -> Result<Option<EvidenceVersion>> {
        let state = self.state.lock().await;
        Ok(state
            .versions
            .iter()
            .find(|v| v.evidence_id == evidence_id && v.version_number == version_number)
            .cloned())
    }

    async fn discard(&self, evidence_id: i64, version_number: i32) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .versions
            .retain(|v| !(v.evidence_id == evidence_id && v.version_number == version_number));
        Ok(())
    }
}

#[async_trait]
impl CustodyRepository for InMemoryStore {
    async fn append(&self, event: NewCustodyEvent) -> Result<CustodyEvent> {
        let mut state = self.state.lock().await;
        state.next_custody_id += 1;
        let event = CustodyEvent {
            id: state.next_custody_id,
            evidence_id: event.evidence_id,
            action: event.action,
            actor_id: event.actor_id,
            location: event.location,
            notes: event.notes,
            witness_id: event.witness_id,
            created_at: event.created_at,
        };
        state.custody.push(event.clone());
        Ok(event)
    }

    async fn list(&self, evidence_id: i64) -> Result<Vec<CustodyEvent>> {
        let state = self.state.lock().await;
        Ok(state
            .custody
            .iter()
            .filter(|e| e.evidence_id == evidence_id)
            .cloned()
            .collect())
    }
}

/// Fixed user directory and case assignments.
#[derive(Debug, Default, Clone)]
pub struct InMemoryCaseAssignments {
    roles: HashMap<i64, Role>,
    assignments: HashMap<(i64, i64), AssignmentStatus>,
}

impl InMemoryCaseAssignments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_role(mut self, actor_id: i64, role: Role) -> Self {
        self.roles.insert(actor_id, role);
        self
    }

    /// Register an actor as staff and record an assignment on a case.
    pub fn assign(mut self, actor_id: i64, case_id: i64, status: AssignmentStatus) -> Self {
        self.roles.entry(actor_id).or_insert(Role::Staff);
        self.assignments.insert((actor_id, case_id), status);
        self
    }
}

#[async_trait]
impl CaseAssignments for InMemoryCaseAssignments {
    async fn is_assigned(&self, actor_id: i64, case_id: i64) -> Result<bool> {
        Ok(self
            .assignments
            .get(&(actor_id, case_id))
            .is_some_and(|status| status.grants_access()))
    }

    async fn actor_role(&self, actor_id: i64) -> Result<Option<Role>> {
        Ok(self.roles.get(&actor_id).copied())
    }
}
