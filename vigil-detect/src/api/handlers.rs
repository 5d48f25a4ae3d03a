//! HTTP request handlers for health, build info and queries

use crate::api::server::AppContext;
use crate::db;
use crate::error::Error;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;
use vigil_common::db::models::{AlertRecord, NotificationRecord, PipelineSettings};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

/// Build identification
#[derive(Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub version: String,
    pub git_hash: String,
    pub build_timestamp: String,
    pub build_profile: String,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            git_hash: env!("GIT_HASH").to_string(),
            build_timestamp: env!("BUILD_TIMESTAMP").to_string(),
            build_profile: env!("BUILD_PROFILE").to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AlertListResponse {
    pub alerts: Vec<AlertRecord>,
}

#[derive(Debug, Serialize)]
pub struct NotificationListResponse {
    pub alert_id: Uuid,
    pub notifications: Vec<NotificationRecord>,
}

pub type ApiError = (StatusCode, Json<StatusResponse>);

/// Map a crate error to the handler error shape
pub fn error_response(e: &Error) -> ApiError {
    (
        e.status_code(),
        Json(StatusResponse {
            status: format!("error: {}", e),
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "vigil-detect".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /build_info
pub async fn get_build_info() -> Json<BuildInfo> {
    Json(BuildInfo::current())
}

/// GET /api/alerts - most recent alerts, newest first
pub async fn list_alerts(
    State(ctx): State<AppContext>,
) -> Result<Json<AlertListResponse>, ApiError> {
    match db::alerts::list_recent_alerts(&ctx.db_pool, db::alerts::RECENT_ALERTS_LIMIT).await {
        Ok(alerts) => Ok(Json(AlertListResponse { alerts })),
        Err(e) => {
            error!("Failed to list alerts: {}", e);
            Err(error_response(&e))
        }
    }
}

/// GET /api/alerts/:alert_id/notifications - delivery attempts for one alert
pub async fn list_alert_notifications(
    State(ctx): State<AppContext>,
    Path(alert_id): Path<Uuid>,
) -> Result<Json<NotificationListResponse>, ApiError> {
    match db::notifications::list_for_alert(&ctx.db_pool, alert_id).await {
        Ok(notifications) => Ok(Json(NotificationListResponse {
            alert_id,
            notifications,
        })),
        Err(e) => {
            error!("Failed to list notifications for {}: {}", alert_id, e);
            Err(error_response(&e))
        }
    }
}

/// GET /api/settings - live runtime settings
pub async fn get_settings(State(ctx): State<AppContext>) -> Json<PipelineSettings> {
    Json(ctx.pipeline.settings())
}
