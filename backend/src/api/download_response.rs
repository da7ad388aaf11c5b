//! Download response for decrypted evidence.
//!
//! The plaintext lives only in this response body; nothing is written
//! to disk or cached on the way out.

use axum::body::Body;
use axum::http::header::{CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::services::evidence_service::EvidenceFile;

/// Header naming the served version, absent for the live file
pub const X_EVIDENCE_VERSION: &str = "x-evidence-version";

/// Attachment response for an evidence file
pub struct DownloadResponse {
    file: EvidenceFile,
}

impl DownloadResponse {
    pub fn new(file: EvidenceFile) -> Self {
        Self { file }
    }
}

impl From<EvidenceFile> for DownloadResponse {
    fn from(file: EvidenceFile) -> Self {
        Self::new(file)
    }
}

/// Build a `Content-Disposition` value that cannot break out of its quotes.
pub fn content_disposition(file_name: &str) -> String {
    let safe: String = file_name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_control() || !c.is_ascii() => '_',
            c => c,
        })
        .collect();
    format!("attachment; filename=\"{}\"", safe)
}

impl IntoResponse for DownloadResponse {
    fn into_response(self) -> Response {
        let EvidenceFile {
            file_name,
            mime_type,
            content,
            version,
        } = self.file;

        let content_type = HeaderValue::from_str(&mime_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
        let disposition = HeaderValue::from_str(&content_disposition(&file_name))
            .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

        let length = content.len();
        let mut response = Response::new(Body::from(content));
        *response.status_mut() = StatusCode::OK;
        let headers = response.headers_mut();
        headers.insert(CONTENT_TYPE, content_type);
        headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
        headers.insert(CONTENT_DISPOSITION, disposition);
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store, private"));
        if let Some(version) = version {
            headers.insert(X_EVIDENCE_VERSION, HeaderValue::from(version));
        }
        response
    }
}
