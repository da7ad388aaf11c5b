//! Application error types and result alias.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::services::encryption::CipherError;
use crate::storage::StorageError;

/// Application result type alias
pub type Result<T> = std::result::Result<T, AppError>;

/// Why a requested evidence version could not be served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionMissing {
    /// No ledger row exists for the version number.
    RowMissing,
    /// The ledger row exists but its encrypted file is gone.
    BlobMissing,
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Request carried no usable actor identity
    #[error("Authentication required: {0}")]
    Unauthenticated(String),

    /// Access Guard denial
    #[error("Access denied: {0}")]
    Forbidden(String),

    /// Evidence item (or other resource) does not exist
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Evidence version does not exist or lost its file
    #[error("Version {version} of evidence {evidence_id} not found ({cause:?})")]
    VersionNotFound {
        evidence_id: i64,
        version: i32,
        cause: VersionMissing,
    },

    /// Concurrent writers collided
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Bad input from the caller
    #[error("Validation error: {0}")]
    Validation(String),

    /// Metadata edit with nothing left to change
    #[error("No changes: {0}")]
    NoOp(String),

    /// Encrypted blob could not be parsed or opened
    #[error("Cipher error: {0}")]
    Cipher(#[from] CipherError),

    /// Blob storage failure
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// The blob operation happened but its custody event could not be written
    #[error("Custody log append failed for evidence {evidence_id} (rolled back: {rolled_back})")]
    CustodyLogFailure { evidence_id: i64, rolled_back: bool },

    /// Operation did not finish before its deadline
    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Address parse error
    #[error("Address parse error: {0}")]
    AddrParse(#[from] std::net::AddrParseError),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Machine-readable code returned to clients.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Migration(_) => "MIGRATION_ERROR",
            AppError::Unauthenticated(_) => "AUTH_ERROR",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::VersionNotFound { .. } => "VERSION_NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::NoOp(_) => "NO_CHANGES",
            AppError::Cipher(CipherError::InvalidFormat) => "INVALID_FORMAT",
            AppError::Cipher(CipherError::DecryptionFailed) => "DECRYPTION_FAILED",
            AppError::Cipher(_) => "CIPHER_ERROR",
            AppError::Storage(_) => "STORAGE_ERROR",
            AppError::CustodyLogFailure { .. } => "CUSTODY_LOG_FAILURE",
            AppError::DeadlineExceeded(_) => "DEADLINE_EXCEEDED",
            AppError::Io(_) => "IO_ERROR",
            AppError::AddrParse(_) => "ADDR_PARSE_ERROR",
            AppError::Json(_) => "JSON_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) | AppError::VersionNotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Validation(_) | AppError::NoOp(_) | AppError::Json(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::DeadlineExceeded(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message. Never includes storage keys, paths or key material.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Unauthenticated(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg)
            | AppError::Validation(msg)
            | AppError::NoOp(msg)
            | AppError::DeadlineExceeded(msg) => msg.clone(),
            AppError::VersionNotFound {
                evidence_id,
                version,
                cause: VersionMissing::RowMissing,
            } => format!("Version {} of evidence {} does not exist", version, evidence_id),
            AppError::VersionNotFound {
                evidence_id,
                version,
                cause: VersionMissing::BlobMissing,
            } => format!(
                "Version {} of evidence {} is recorded but its file is missing",
                version, evidence_id
            ),
            AppError::Cipher(CipherError::InvalidFormat) => {
                "Stored evidence file is not in the expected encrypted format".to_string()
            }
            AppError::Cipher(CipherError::DecryptionFailed) => {
                "Stored evidence file could not be decrypted".to_string()
            }
            AppError::Cipher(_) => "Encryption failure".to_string(),
            AppError::Storage(_) | AppError::Io(_) => "Evidence storage operation failed".to_string(),
            AppError::CustodyLogFailure {
                evidence_id,
                rolled_back: true,
            } => format!(
                "Chain of custody could not be recorded for evidence {}; the operation was not applied",
                evidence_id
            ),
            AppError::CustodyLogFailure {
                evidence_id,
                rolled_back: false,
            } => format!(
                "Chain of custody could not be recorded for evidence {}; flagged for manual reconciliation",
                evidence_id
            ),
            AppError::Database(_) => "Database operation failed".to_string(),
            AppError::Migration(_) => "Database migration failed".to_string(),
            AppError::Json(_) => "Invalid JSON".to_string(),
            AppError::AddrParse(_) => "Invalid address".to_string(),
            AppError::Config(_) | AppError::Internal(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        if status.is_server_error() {
            tracing::error!(error = %self, code = code, "Request error");
        } else {
            tracing::debug!(error = %self, code = code, "Request rejected");
        }

        let body = Json(json!({
            "code": code,
            "message": self.public_message(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_hides_key() {
        let err = AppError::Storage(StorageError::Missing(
            "evidence/2024/case_42/abc.enc".to_string(),
        ));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.public_message().contains("case_42"));
        assert!(err.to_string().contains("case_42"));
    }

    #[test]
    fn test_version_not_found_causes_are_distinct() {
        let row = AppError::VersionNotFound {
            evidence_id: 1,
            version: 3,
            cause: VersionMissing::RowMissing,
        };
        let blob = AppError::VersionNotFound {
            evidence_id: 1,
            version: 3,
            cause: VersionMissing::BlobMissing,
        };
        assert_eq!(row.status(), StatusCode::NOT_FOUND);
        assert_eq!(row.code(), blob.code());
        assert_ne!(row.public_message(), blob.public_message());
    }

    #[test]
    fn test_cipher_codes() {
        assert_eq!(
            AppError::Cipher(CipherError::InvalidFormat).code(),
            "INVALID_FORMAT"
        );
        assert_eq!(
            AppError::Cipher(CipherError::DecryptionFailed).code(),
            "DECRYPTION_FAILED"
        );
    }

    #[test]
    fn test_client_errors_map_to_4xx() {
        assert_eq!(
            AppError::Forbidden("no".into()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::Validation("bad".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::NoOp("empty".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::CustodyLogFailure {
                evidence_id: 9,
                rolled_back: false
            }
            .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
