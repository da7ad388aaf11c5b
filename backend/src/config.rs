//! Application configuration loaded from environment variables.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::models::evidence::EvidenceType;

/// Default upload ceiling: 50 MB.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

/// Default deadline for blob reads and writes.
pub const DEFAULT_REQUEST_DEADLINE_SECS: u64 = 120;

/// Default age below which unreferenced blobs are left alone by a purge.
pub const DEFAULT_ORPHAN_GRACE_SECS: u64 = 3600;

/// Application configuration
#[derive(Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Server bind address (host:port)
    pub bind_address: String,

    /// Log level
    pub log_level: String,

    /// Root directory for encrypted evidence blobs
    pub storage_path: String,

    /// Secret the blob encryption key is derived from
    pub encryption_key: String,

    /// Largest accepted evidence file, in bytes
    pub max_upload_bytes: u64,

    /// Deadline applied to blob reads and writes, in seconds
    pub request_deadline_secs: u64,

    /// Minimum age, in seconds, of a blob before the orphan scan may
    /// purge it. Keep it above the request deadline.
    pub orphan_grace_secs: u64,

    /// Accepted MIME types per evidence type
    pub allowed_mime_types: HashMap<EvidenceType, Vec<String>>,
}

redacted_debug!(Config {
    redact database_url,
    show bind_address,
    show log_level,
    show storage_path,
    redact encryption_key,
    show max_upload_bytes,
    show request_deadline_secs,
    show orphan_grace_secs,
    show allowed_mime_types,
});

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let encryption_key = env::var("EVIDENCE_ENCRYPTION_KEY")
            .map_err(|_| AppError::Config("EVIDENCE_ENCRYPTION_KEY not set".into()))?;
        if encryption_key.trim().is_empty() {
            return Err(AppError::Config("EVIDENCE_ENCRYPTION_KEY is empty".into()));
        }

        let mut allowed_mime_types = default_allowed_mime_types();
        for evidence_type in EvidenceType::ALL {
            let var = format!(
                "EVIDENCE_ALLOWED_MIME_{}",
                evidence_type.as_str().to_uppercase()
            );
            if let Ok(list) = env::var(&var) {
                allowed_mime_types.insert(evidence_type, parse_mime_list(&list));
            }
        }

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .map_err(|_| AppError::Config("DATABASE_URL not set".into()))?,
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            storage_path: env::var("STORAGE_PATH")
                .unwrap_or_else(|_| "/var/lib/evidence-locker/blobs".into()),
            encryption_key,
            max_upload_bytes: env::var("MAX_UPLOAD_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            request_deadline_secs: env::var("REQUEST_DEADLINE_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_REQUEST_DEADLINE_SECS),
            orphan_grace_secs: env::var("ORPHAN_GRACE_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_ORPHAN_GRACE_SECS),
            allowed_mime_types,
        })
    }
}

/// Upload rules the evidence registry enforces.
#[derive(Debug, Clone)]
pub struct EvidencePolicy {
    pub max_upload_bytes: u64,
    pub allowed_mime_types: HashMap<EvidenceType, Vec<String>>,
    pub deadline: Duration,
}

impl Default for EvidencePolicy {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            allowed_mime_types: default_allowed_mime_types(),
            deadline: Duration::from_secs(DEFAULT_REQUEST_DEADLINE_SECS),
        }
    }
}

impl EvidencePolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_upload_bytes: config.max_upload_bytes,
            allowed_mime_types: config.allowed_mime_types.clone(),
            deadline: Duration::from_secs(config.request_deadline_secs),
        }
    }

    /// Whether `mime_type` may be stored as evidence of `evidence_type`.
    ///
    /// Parameters such as `; charset=utf-8` are ignored, and an allow-list
    /// entry of the form `image/*` accepts every subtype.
    pub fn is_mime_allowed(&self, evidence_type: EvidenceType, mime_type: &str) -> bool {
        let mime = normalize_mime(mime_type);
        if mime.is_empty() {
            return false;
        }
        let Some(allowed) = self.allowed_mime_types.get(&evidence_type) else {
            return false;
        };
        allowed.iter().any(|entry| {
            if let Some(major) = entry.strip_suffix("/*") {
                mime.split('/').next() == Some(major)
            } else {
                *entry == mime
            }
        })
    }
}

fn normalize_mime(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn parse_mime_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(normalize_mime)
        .filter(|m| !m.is_empty())
        .collect()
}

/// Built-in MIME allow-list for each evidence type.
pub fn default_allowed_mime_types() -> HashMap<EvidenceType, Vec<String>> {
    let photo = [
        "image/jpeg",
        "image/png",
        "image/gif",
        "image/webp",
        "image/tiff",
        "image/bmp",
        "image/heic",
    ];
    let video = [
        "video/mp4",
        "video/mpeg",
        "video/quicktime",
        "video/x-msvideo",
        "video/x-matroska",
        "video/webm",
    ];
    let audio = [
        "audio/mpeg",
        "audio/wav",
        "audio/x-wav",
        "audio/ogg",
        "audio/mp4",
        "audio/aac",
        "audio/flac",
        "audio/webm",
    ];
    let document = [
        "application/pdf",
        "application/msword",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "application/vnd.ms-excel",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "application/rtf",
        "text/plain",
        "text/csv",
    ];
    let physical = ["image/jpeg", "image/png", "image/heic", "application/pdf"];
    let digital = [
        "application/octet-stream",
        "application/zip",
        "application/gzip",
        "application/x-tar",
        "application/x-7z-compressed",
        "application/json",
        "application/xml",
        "application/pdf",
        "text/plain",
        "text/csv",
        "image/*",
        "video/*",
        "audio/*",
    ];

    let to_vec = |list: &[&str]| list.iter().map(|m| m.to_string()).collect::<Vec<_>>();

    HashMap::from([
        (EvidenceType::Photo, to_vec(&photo)),
        (EvidenceType::Video, to_vec(&video)),
        (EvidenceType::Audio, to_vec(&audio)),
        (EvidenceType::Document, to_vec(&document)),
        (EvidenceType::Physical, to_vec(&physical)),
        (EvidenceType::Digital, to_vec(&digital)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_photo_accepts_jpeg_only_images() {
        let policy = EvidencePolicy::default();
        assert!(policy.is_mime_allowed(EvidenceType::Photo, "image/jpeg"));
        assert!(policy.is_mime_allowed(EvidenceType::Photo, "IMAGE/PNG"));
        assert!(!policy.is_mime_allowed(EvidenceType::Photo, "application/pdf"));
        assert!(!policy.is_mime_allowed(EvidenceType::Photo, ""));
    }

    #[test]
    fn test_mime_parameters_are_ignored() {
        let policy = EvidencePolicy::default();
        assert!(policy.is_mime_allowed(EvidenceType::Document, "text/plain; charset=utf-8"));
    }

    #[test]
    fn test_wildcard_entries() {
        let policy = EvidencePolicy::default();
        assert!(policy.is_mime_allowed(EvidenceType::Digital, "image/x-raw"));
        assert!(policy.is_mime_allowed(EvidenceType::Digital, "video/ogg"));
        assert!(!policy.is_mime_allowed(EvidenceType::Digital, "model/gltf+json"));
    }

    #[test]
    fn test_parse_mime_list() {
        assert_eq!(
            parse_mime_list(" image/jpeg, ,Image/PNG ;q=1"),
            vec!["image/jpeg".to_string(), "image/png".to_string()]
        );
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = Config {
            database_url: "postgresql://user:pw@db/evidence".into(),
            bind_address: "127.0.0.1:8080".into(),
            log_level: "info".into(),
            storage_path: "/tmp/blobs".into(),
            encryption_key: "very-secret-key".into(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            request_deadline_secs: DEFAULT_REQUEST_DEADLINE_SECS,
            orphan_grace_secs: DEFAULT_ORPHAN_GRACE_SECS,
            allowed_mime_types: default_allowed_mime_types(),
        };
        let output = format!("{:?}", config);
        assert!(!output.contains("very-secret-key"));
        assert!(!output.contains("user:pw"));
        assert!(output.contains("127.0.0.1:8080"));
    }
}
