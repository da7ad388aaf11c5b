//! Case-assignment lookup.
//!
//! Users and case assignments are owned by the case-management side of
//! the system; this module only reads them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::error::Result;
use crate::models::actor::Role;

/// Status of an actor's assignment to a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AssignmentStatus {
    Pending,
    Active,
    Completed,
    Removed,
}

impl AssignmentStatus {
    /// Active and completed assignments grant evidence access.
    pub fn grants_access(self) -> bool {
        matches!(self, AssignmentStatus::Active | AssignmentStatus::Completed)
    }
}

#[async_trait]
pub trait CaseAssignments: Send + Sync {
    /// Whether the actor holds an active or completed assignment on the case.
    async fn is_assigned(&self, actor_id: i64, case_id: i64) -> Result<bool>;

    /// Role of the actor, or `None` for unknown or disabled users.
    async fn actor_role(&self, actor_id: i64) -> Result<Option<Role>>;
}

pub struct SqlxCaseAssignments {
    pool: PgPool,
}

impl SqlxCaseAssignments {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CaseAssignments for SqlxCaseAssignments {
    async fn is_assigned(&self, actor_id: i64, case_id: i64) -> Result<bool> {
        let assigned = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM case_assignments
                WHERE user_id = $1 AND case_id = $2 AND status IN ('active', 'completed')
            )
            "#,
        )
        .bind(actor_id)
        .bind(case_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(assigned)
    }

    async fn actor_role(&self, actor_id: i64) -> Result<Option<Role>> {
        let role = sqlx::query_scalar::<_, String>(
            "SELECT role FROM users WHERE id = $1 AND is_active = true",
        )
        .bind(actor_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(role.as_deref().map(Role::from_db))
    }
}
