//! Storage maintenance handlers (administrators only).

use axum::{
    extract::State,
    routing::{get, post},
    Extension, Json, Router,
};

use crate::api::middleware::actor::{require_actor, ActorExtension};
use crate::api::SharedState;
use crate::error::Result;
use crate::services::orphan_scan::{OrphanReport, PurgeReport};

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/storage/orphans", get(scan_orphans))
        .route("/storage/orphans/purge", post(purge_orphans))
}

async fn scan_orphans(
    State(state): State<SharedState>,
    Extension(actor): Extension<Option<ActorExtension>>,
) -> Result<Json<OrphanReport>> {
    let actor = require_actor(actor)?;
    Ok(Json(state.orphan_scanner.scan(actor).await?))
}

async fn purge_orphans(
    State(state): State<SharedState>,
    Extension(actor): Extension<Option<ActorExtension>>,
) -> Result<Json<PurgeReport>> {
    let actor = require_actor(actor)?;
    Ok(Json(state.orphan_scanner.purge(actor).await?))
}
