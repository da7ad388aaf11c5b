//! Access guard for evidence operations.
//!
//! Administrators pass every check. Everyone else needs an active or
//! completed assignment on the owning case, and can never delete.

use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::actor::{Actor, Role};
use crate::repositories::CaseAssignments;

/// Operations the guard decides on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvidenceOperation {
    Read,
    Upload,
    Download,
    Replace,
    Edit,
    AddCustody,
    Delete,
    /// Storage maintenance (orphan scan and purge).
    Maintenance,
}

impl EvidenceOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceOperation::Read => "read",
            EvidenceOperation::Upload => "upload",
            EvidenceOperation::Download => "download",
            EvidenceOperation::Replace => "replace",
            EvidenceOperation::Edit => "edit",
            EvidenceOperation::AddCustody => "add_custody",
            EvidenceOperation::Delete => "delete",
            EvidenceOperation::Maintenance => "maintenance",
        }
    }

    /// Operations no case assignment can grant.
    pub fn requires_admin(&self) -> bool {
        matches!(
            self,
            EvidenceOperation::Delete | EvidenceOperation::Maintenance
        )
    }
}

pub struct AccessGuard {
    assignments: Arc<dyn CaseAssignments>,
}

impl AccessGuard {
    pub fn new(assignments: Arc<dyn CaseAssignments>) -> Self {
        Self { assignments }
    }

    /// Allow `actor` to perform `operation` on evidence of `case_id`, or
    /// fail with `Forbidden`.
    pub async fn authorize(
        &self,
        actor: Actor,
        case_id: i64,
        operation: EvidenceOperation,
    ) -> Result<()> {
        let role = self.assignments.actor_role(actor.id).await?;
        if role.is_some_and(Role::is_admin) {
            return Ok(());
        }

        if role.is_some()
            && !operation.requires_admin()
            && self.assignments.is_assigned(actor.id, case_id).await?
        {
            return Ok(());
        }

        tracing::warn!(
            actor_id = actor.id,
            case_id,
            operation = operation.as_str(),
            "Evidence access denied"
        );
        Err(AppError::Forbidden(format!(
            "Not permitted to {} evidence of case {}",
            operation.as_str(),
            case_id
        )))
    }

    /// Require an administrator, independent of any case.
    pub async fn authorize_admin(&self, actor: Actor, operation: EvidenceOperation) -> Result<()> {
        let role = self.assignments.actor_role(actor.id).await?;
        if role.is_some_and(Role::is_admin) {
            return Ok(());
        }
        tracing::warn!(
            actor_id = actor.id,
            operation = operation.as_str(),
            "Administrator operation denied"
        );
        Err(AppError::Forbidden(format!(
            "Administrator role required to {}",
            operation.as_str()
        )))
    }
}
