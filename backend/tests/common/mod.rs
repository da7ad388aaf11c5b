//! Common test utilities for backend integration tests
//!
//! This module provides shared infrastructure for testing:
//! - An in-memory application over a temporary blob directory
//! - Request helpers built on `tower::ServiceExt::oneshot`
//! - A minimal multipart body builder

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use evidence_locker_backend::api::{routes::create_router, AppState};
use evidence_locker_backend::config::{
    default_allowed_mime_types, Config, DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_REQUEST_DEADLINE_SECS,
};
use evidence_locker_backend::models::actor::Role;
use evidence_locker_backend::repositories::{
    AssignmentStatus, InMemoryCaseAssignments, InMemoryStore, Repositories,
};
use evidence_locker_backend::storage::filesystem::FilesystemStorage;

pub const ADMIN: i64 = 1;
/// Assigned (active) to `CASE_ID`.
pub const OFFICER: i64 = 7;
/// Known user without any assignment.
pub const OUTSIDER: i64 = 8;
pub const CASE_ID: i64 = 42;

pub const BOUNDARY: &str = "evidence-test-boundary";

/// Test application with its backing stores exposed for inspection
pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryStore>,
    pub storage: Arc<FilesystemStorage>,
    pub dir: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let config = Config {
            database_url: String::new(),
            bind_address: "127.0.0.1:0".into(),
            log_level: "info".into(),
            storage_path: dir.path().to_string_lossy().into_owned(),
            encryption_key: "integration-test-secret".into(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            request_deadline_secs: DEFAULT_REQUEST_DEADLINE_SECS,
            // Blobs written by a test are purgeable right away
            orphan_grace_secs: 0,
            allowed_mime_types: default_allowed_mime_types(),
        };

        let store = Arc::new(InMemoryStore::new());
        let assignments = InMemoryCaseAssignments::new()
            .with_role(ADMIN, Role::Admin)
            .assign(OFFICER, CASE_ID, AssignmentStatus::Active)
            .with_role(OUTSIDER, Role::Staff);
        let storage = Arc::new(FilesystemStorage::new(dir.path()));

        let state = AppState::new(
            config,
            Repositories::in_memory(store.clone(), assignments),
            storage.clone(),
        );
        let router = create_router(Arc::new(state));

        Self {
            router,
            store,
            storage,
            dir,
        }
    }

    /// Send a request and collect the whole response
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str, actor: Option<i64>) -> TestResponse {
        self.send(request("GET", uri, actor).body(Body::empty()).unwrap())
            .await
    }

    pub async fn json(
        &self,
        method: &str,
        uri: &str,
        actor: Option<i64>,
        body: serde_json::Value,
    ) -> TestResponse {
        self.send(
            request(method, uri, actor)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn multipart(&self, uri: &str, actor: Option<i64>, form: Multipart) -> TestResponse {
        self.send(
            request("POST", uri, actor)
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", BOUNDARY),
                )
                .body(Body::from(form.finish()))
                .unwrap(),
        )
        .await
    }

    /// Upload a photo to `CASE_ID` as the officer and return its id
    pub async fn upload_photo(&self, content: &[u8]) -> i64 {
        let form = Multipart::new()
            .text("case_id", &CASE_ID.to_string())
            .text("evidence_type", "photo")
            .text("title", "Scene overview")
            .file("scene.jpg", "image/jpeg", content);
        let response = self.multipart("/api/v1/evidence", Some(OFFICER), form).await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.text());
        response.json_body()["id"].as_i64().unwrap()
    }
}

pub fn request(method: &str, uri: &str, actor: Option<i64>) -> axum::http::request::Builder {
    let builder = Request::builder().method(method).uri(uri);
    match actor {
        Some(id) => builder.header("x-actor-id", id.to_string()),
        None => builder,
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn json_body(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn error_code(&self) -> String {
        self.json_body()["code"].as_str().unwrap_or_default().to_string()
    }
}

/// Minimal multipart/form-data body builder
#[derive(Default)]
pub struct Multipart {
    body: Vec<u8>,
}

impl Multipart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, file_name: &str, mime_type: &str, content: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                BOUNDARY, file_name, mime_type
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(content);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.body
            .extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        self.body
    }
}
