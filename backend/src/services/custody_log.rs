//! Chain-of-custody logging service.
//!
//! The log is append-only: this service exposes `append` and read
//! methods and nothing that could change or remove an entry.

use std::sync::Arc;

use chrono::Utc;

use crate::error::Result;
use crate::models::actor::Actor;
use crate::models::custody::{CustodyAction, CustodyEvent, NewCustodyEvent};
use crate::repositories::CustodyRepository;

/// Custody log entry builder
#[derive(Debug, Clone)]
pub struct CustodyEntry {
    evidence_id: i64,
    action: CustodyAction,
    actor_id: i64,
    location: Option<String>,
    notes: Option<String>,
    witness_id: Option<i64>,
}

impl CustodyEntry {
    pub fn new(evidence_id: i64, action: CustodyAction, actor: Actor) -> Self {
        Self {
            evidence_id,
            action,
            actor_id: actor.id,
            location: None,
            notes: None,
            witness_id: None,
        }
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn witness(mut self, witness_id: i64) -> Self {
        self.witness_id = Some(witness_id);
        self
    }

    pub fn maybe_location(mut self, location: Option<String>) -> Self {
        self.location = location;
        self
    }

    pub fn maybe_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }

    pub fn maybe_witness(mut self, witness_id: Option<i64>) -> Self {
        self.witness_id = witness_id;
        self
    }
}

/// Custody log service
pub struct CustodyLog {
    repo: Arc<dyn CustodyRepository>,
}

impl CustodyLog {
    pub fn new(repo: Arc<dyn CustodyRepository>) -> Self {
        Self { repo }
    }

    /// Append one entry
    pub async fn append(&self, entry: CustodyEntry) -> Result<CustodyEvent> {
        let event = self
            .repo
            .append(NewCustodyEvent {
                evidence_id: entry.evidence_id,
                action: entry.action,
                actor_id: entry.actor_id,
                location: entry.location,
                notes: entry.notes,
                witness_id: entry.witness_id,
                created_at: Utc::now(),
            })
            .await?;

        tracing::info!(
            target: "evidence_audit",
            evidence_id = event.evidence_id,
            action = event.action.as_str(),
            actor_id = event.actor_id,
            event_id = event.id,
            "Custody event recorded"
        );

        Ok(event)
    }

    /// Full custody history of an item, oldest first
    pub async fn history(&self, evidence_id: i64) -> Result<Vec<CustodyEvent>> {
        self.repo.list(evidence_id).await
    }
}
