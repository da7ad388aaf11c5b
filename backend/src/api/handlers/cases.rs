//! Case-scoped evidence listing.

use axum::{
    extract::{Path, State},
    routing::get,
    Extension, Json, Router,
};

use crate::api::dto::ListResponse;
use crate::api::middleware::actor::{require_actor, ActorExtension};
use crate::api::SharedState;
use crate::error::Result;
use crate::models::evidence::EvidenceItem;

pub fn router() -> Router<SharedState> {
    Router::new().route("/:case_id/evidence", get(list_case_evidence))
}

async fn list_case_evidence(
    State(state): State<SharedState>,
    Extension(actor): Extension<Option<ActorExtension>>,
    Path(case_id): Path<i64>,
) -> Result<Json<ListResponse<EvidenceItem>>> {
    let actor = require_actor(actor)?;
    let items = state.evidence_service.list_by_case(case_id, actor).await?;
    Ok(Json(items.into()))
}
