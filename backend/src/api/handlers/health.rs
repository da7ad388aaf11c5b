//! Health check endpoints.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::api::SharedState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<CheckStatus>,
    pub storage: CheckStatus,
}

#[derive(Serialize)]
pub struct CheckStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CheckStatus {
    fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            message: None,
        }
    }

    fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            status: "unhealthy".to_string(),
            message: Some(message.into()),
        }
    }

    fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// Liveness check covering the database (when configured) and blob storage
pub async fn health_check(State(state): State<SharedState>) -> impl IntoResponse {
    let database = match &state.db {
        Some(pool) => Some(match sqlx::query("SELECT 1").fetch_one(pool).await {
            Ok(_) => CheckStatus::healthy(),
            Err(e) => {
                tracing::warn!("Health check database failure: {}", e);
                CheckStatus::unhealthy("Database connection failed")
            }
        }),
        None => None,
    };

    let storage = match tokio::fs::metadata(&state.config.storage_path).await {
        Ok(meta) if meta.is_dir() => CheckStatus::healthy(),
        Ok(_) => CheckStatus::unhealthy("Storage path is not a directory"),
        Err(e) => {
            tracing::warn!("Health check storage failure: {}", e);
            CheckStatus::unhealthy("Storage path is not accessible")
        }
    };

    let healthy = storage.is_healthy() && database.as_ref().map_or(true, CheckStatus::is_healthy);
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthResponse {
            status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            checks: HealthChecks { database, storage },
        }),
    )
}
