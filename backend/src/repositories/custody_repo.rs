use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::Result;
use crate::models::custody::{CustodyEvent, NewCustodyEvent};

/// Append-only access to the custody log. There is deliberately no
/// update or delete.
#[async_trait]
pub trait CustodyRepository: Send + Sync {
    async fn append(&self, event: NewCustodyEvent) -> Result<CustodyEvent>;

    /// Events of one item in insertion order.
    async fn list(&self, evidence_id: i64) -> Result<Vec<CustodyEvent>>;
}

pub struct SqlxCustodyRepository {
    pool: PgPool,
}

impl SqlxCustodyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CustodyRepository for SqlxCustodyRepository {
    async fn append(&self, event: NewCustodyEvent) -> Result<CustodyEvent> {
        let row = sqlx::query_as::<_, CustodyEvent>(
            r#"
            INSERT INTO evidence_custody_log
                (evidence_id, action, actor_id, location, notes, witness_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, evidence_id, action, actor_id, location, notes, witness_id, created_at
            "#,
        )
        .bind(event.evidence_id)
        .bind(event.action)
        .bind(event.actor_id)
        .bind(&event.location)
        .bind(&event.notes)
        .bind(event.witness_id)
        .bind(event.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list(&self, evidence_id: i64) -> Result<Vec<CustodyEvent>> {
        let rows = sqlx::query_as::<_, CustodyEvent>(
            r#"
            SELECT id, evidence_id, action, actor_id, location, notes, witness_id, created_at
            FROM evidence_custody_log
            WHERE evidence_id = $1
            ORDER BY id
            "#,
        )
        .bind(evidence_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
