//! Evidence handlers.

use std::collections::HashMap;

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};

use crate::api::download_response::DownloadResponse;
use crate::api::dto::{CustodyEntryRequest, ListResponse};
use crate::api::middleware::actor::{require_actor, ActorExtension};
use crate::api::SharedState;
use crate::error::{AppError, Result};
use crate::models::custody::CustodyEvent;
use crate::models::edit_history::EditHistoryEntry;
use crate::models::evidence::{EvidenceItem, EvidenceMetadata, EvidenceType, MetadataChanges};
use crate::models::version::EvidenceVersion;
use crate::services::evidence_service::{EvidenceDetail, FileUpload};

/// Create evidence routes
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", post(upload))
        .route("/:id", get(get_evidence).put(edit_metadata).delete(delete_evidence))
        .route("/:id/replace-file", post(replace_file))
        .route("/:id/download", get(download))
        .route("/:id/download-version/:version", get(download_version))
        .route("/:id/versions", get(list_versions))
        .route("/:id/history", get(history))
        .route("/:id/custody-log", get(custody_log).post(add_custody_entry))
}

/// Fields of a multipart evidence request
#[derive(Default)]
struct MultipartForm {
    file: Option<FileUpload>,
    fields: HashMap<String, String>,
}

impl MultipartForm {
    fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, name: &str) -> Result<&str> {
        self.text(name)
            .ok_or_else(|| AppError::Validation(format!("Field '{}' is required", name)))
    }

    fn take_file(&mut self) -> Result<FileUpload> {
        self.file
            .take()
            .ok_or_else(|| AppError::Validation("Field 'file' is required".into()))
    }

    /// Metadata either as one JSON `metadata` field or as individual fields.
    fn metadata(&self) -> Result<EvidenceMetadata> {
        if let Some(json) = self.text("metadata") {
            return serde_json::from_str(json)
                .map_err(|e| AppError::Validation(format!("Invalid metadata: {}", e)));
        }

        let evidence_type: EvidenceType = self.required("evidence_type")?.parse()?;
        let mut metadata = EvidenceMetadata::new(evidence_type, self.required("title")?);
        metadata.description = self.text("description").map(str::to_string);
        metadata.tags = self
            .text("tags")
            .map(|t| t.split(',').map(|tag| tag.trim().to_string()).collect())
            .unwrap_or_default();
        metadata.is_critical = self
            .text("is_critical")
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on"))
            .unwrap_or(false);
        metadata.source = self.text("source").map(str::to_string);
        metadata.collection_location = self.text("collection_location").map(str::to_string);
        metadata.collected_by = self.text("collected_by").map(parse_id).transpose()?;
        metadata.source_person_id = self.text("source_person_id").map(parse_id).transpose()?;
        metadata.collected_at = self
            .text("collected_at")
            .map(|v| {
                DateTime::parse_from_rfc3339(v)
                    .map(|t| t.with_timezone(&Utc))
                    .map_err(|_| AppError::Validation("collected_at must be RFC 3339".into()))
            })
            .transpose()?;
        Ok(metadata)
    }
}

fn parse_id(value: &str) -> Result<i64> {
    value
        .parse()
        .map_err(|_| AppError::Validation(format!("Invalid id: {}", value)))
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> AppError {
    AppError::Validation(format!("Invalid multipart body: {}", e))
}

async fn read_multipart(mut multipart: Multipart) -> Result<MultipartForm> {
    let mut form = MultipartForm::default();
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or("").to_string();
        if name == "file" {
            let file_name = field.file_name().unwrap_or("").to_string();
            let mime_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let content = field.bytes().await.map_err(multipart_error)?;
            form.file = Some(FileUpload {
                file_name,
                mime_type,
                content,
            });
        } else {
            let value = field.text().await.map_err(multipart_error)?;
            form.fields.insert(name, value);
        }
    }
    Ok(form)
}

async fn upload(
    State(state): State<SharedState>,
    Extension(actor): Extension<Option<ActorExtension>>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<EvidenceItem>)> {
    let actor = require_actor(actor)?;
    let mut form = read_multipart(multipart).await?;

    let case_id = parse_id(form.required("case_id")?)?;
    let metadata = form.metadata()?;
    let file = form.take_file()?;

    let item = state
        .evidence_service
        .upload(case_id, metadata, file, actor)
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn get_evidence(
    State(state): State<SharedState>,
    Extension(actor): Extension<Option<ActorExtension>>,
    Path(id): Path<i64>,
) -> Result<Json<EvidenceDetail>> {
    let actor = require_actor(actor)?;
    Ok(Json(state.evidence_service.get(id, actor).await?))
}

async fn edit_metadata(
    State(state): State<SharedState>,
    Extension(actor): Extension<Option<ActorExtension>>,
    Path(id): Path<i64>,
    Json(changes): Json<MetadataChanges>,
) -> Result<Json<EvidenceItem>> {
    let actor = require_actor(actor)?;
    Ok(Json(
        state
            .evidence_service
            .edit_metadata(id, changes, actor)
            .await?,
    ))
}

async fn delete_evidence(
    State(state): State<SharedState>,
    Extension(actor): Extension<Option<ActorExtension>>,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    let actor = require_actor(actor)?;
    state.evidence_service.delete(id, actor).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn replace_file(
    State(state): State<SharedState>,
    Extension(actor): Extension<Option<ActorExtension>>,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> Result<Json<EvidenceItem>> {
    let actor = require_actor(actor)?;
    let mut form = read_multipart(multipart).await?;
    let note = form.text("note").map(str::to_string);
    let file = form.take_file()?;

    Ok(Json(
        state
            .evidence_service
            .replace_file(id, file, note, actor)
            .await?,
    ))
}

async fn download(
    State(state): State<SharedState>,
    Extension(actor): Extension<Option<ActorExtension>>,
    Path(id): Path<i64>,
) -> Result<DownloadResponse> {
    let actor = require_actor(actor)?;
    let file = state.evidence_service.download(id, actor).await?;
    Ok(DownloadResponse::from(file))
}

async fn download_version(
    State(state): State<SharedState>,
    Extension(actor): Extension<Option<ActorExtension>>,
    Path((id, version)): Path<(i64, i32)>,
) -> Result<DownloadResponse> {
    let actor = require_actor(actor)?;
    let file = state
        .evidence_service
        .download_version(id, version, actor)
        .await?;
    Ok(DownloadResponse::from(file))
}

async fn list_versions(
    State(state): State<SharedState>,
    Extension(actor): Extension<Option<ActorExtension>>,
    Path(id): Path<i64>,
) -> Result<Json<ListResponse<EvidenceVersion>>> {
    let actor = require_actor(actor)?;
    let versions = state.evidence_service.list_versions(id, actor).await?;
    Ok(Json(versions.into()))
}

async fn history(
    State(state): State<SharedState>,
    Extension(actor): Extension<Option<ActorExtension>>,
    Path(id): Path<i64>,
) -> Result<Json<ListResponse<EditHistoryEntry>>> {
    let actor = require_actor(actor)?;
    let entries = state.evidence_service.history(id, actor).await?;
    Ok(Json(entries.into()))
}

async fn custody_log(
    State(state): State<SharedState>,
    Extension(actor): Extension<Option<ActorExtension>>,
    Path(id): Path<i64>,
) -> Result<Json<ListResponse<CustodyEvent>>> {
    let actor = require_actor(actor)?;
    let events = state.evidence_service.custody_log(id, actor).await?;
    Ok(Json(events.into()))
}

async fn add_custody_entry(
    State(state): State<SharedState>,
    Extension(actor): Extension<Option<ActorExtension>>,
    Path(id): Path<i64>,
    Json(req): Json<CustodyEntryRequest>,
) -> Result<(StatusCode, Json<CustodyEvent>)> {
    let actor = require_actor(actor)?;
    let event = state
        .evidence_service
        .add_custody_entry(id, req.action, actor, req.location, req.notes, req.witness_id)
        .await?;
    Ok((StatusCode::CREATED, Json(event)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(fields: &[(&str, &str)]) -> MultipartForm {
        MultipartForm {
            file: None,
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_metadata_from_fields() {
        let meta = form(&[
            ("evidence_type", "Photo"),
            ("title", " Scene overview "),
            ("tags", "exterior, night"),
            ("is_critical", "true"),
            ("collected_at", "2024-03-01T10:00:00Z"),
        ])
        .metadata()
        .unwrap();
        assert_eq!(meta.evidence_type, EvidenceType::Photo);
        assert_eq!(meta.title, "Scene overview");
        assert_eq!(meta.tags, vec!["exterior", "night"]);
        assert!(meta.is_critical);
        assert!(meta.collected_at.is_some());
    }

    #[test]
    fn test_metadata_from_json_field() {
        let meta = form(&[(
            "metadata",
            r#"{"evidence_type": "document", "title": "Statement", "source": "Witness"}"#,
        )])
        .metadata()
        .unwrap();
        assert_eq!(meta.evidence_type, EvidenceType::Document);
        assert_eq!(meta.source.as_deref(), Some("Witness"));
    }

    #[test]
    fn test_metadata_missing_fields() {
        assert!(matches!(
            form(&[("title", "x")]).metadata(),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            form(&[("evidence_type", "hologram"), ("title", "x")]).metadata(),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            form(&[]).take_file(),
            Err(AppError::Validation(_))
        ));
    }
}
