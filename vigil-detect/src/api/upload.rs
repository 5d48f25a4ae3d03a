//! Video upload ingress
//!
//! `POST /api/upload` with a multipart `video` field. Every check runs
//! before a byte reaches the media store: missing field or empty filename
//! (400), extension not allowed (415), larger than the cap (413).

use crate::api::handlers::{ApiError, StatusResponse};
use crate::api::server::AppContext;
use crate::db;
use crate::media::has_allowed_extension;
use axum::{
    extract::{multipart::Field, Multipart, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Multipart field carrying the video
pub const VIDEO_FIELD: &str = "video";

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub message: String,
    pub filename: String,
}

async fn reject(ctx: &AppContext, status: StatusCode, reason: String) -> ApiError {
    warn!("Upload rejected: {}", reason);
    db::audit::record(&ctx.db_pool, "upload_failed", &reason).await;
    (
        status,
        Json(StatusResponse {
            status: format!("error: {}", reason),
        }),
    )
}

/// Read a field fully, giving up as soon as it exceeds `max_bytes`
async fn read_capped(
    field: &mut Field<'_>,
    max_bytes: usize,
) -> Result<Option<Vec<u8>>, axum::extract::multipart::MultipartError> {
    let mut data = Vec::new();
    while let Some(chunk) = field.chunk().await? {
        if data.len() + chunk.len() > max_bytes {
            return Ok(None);
        }
        data.extend_from_slice(&chunk);
    }
    Ok(Some(data))
}

/// POST /api/upload
pub async fn upload_video(
    State(ctx): State<AppContext>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let max_bytes = ctx.upload.max_bytes;

    loop {
        let mut field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => {
                let reason = "no video field in request".to_string();
                return Err(reject(&ctx, StatusCode::BAD_REQUEST, reason).await);
            }
            Err(e) => {
                let status = e.status();
                let reason = format!("malformed upload: {}", e.body_text());
                return Err(reject(&ctx, status, reason).await);
            }
        };

        if field.name() != Some(VIDEO_FIELD) {
            continue;
        }

        let original = field.file_name().unwrap_or_default().to_string();
        if original.trim().is_empty() {
            return Err(reject(&ctx, StatusCode::BAD_REQUEST, "no file selected".into()).await);
        }

        if !has_allowed_extension(&original, &ctx.upload.allowed_extensions) {
            return Err(reject(
                &ctx,
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                format!(
                    "file type not allowed: {} (allowed: {})",
                    original,
                    ctx.upload.allowed_extensions.join(", ")
                ),
            )
            .await);
        }

        let data = match read_capped(&mut field, max_bytes).await {
            Ok(Some(data)) => data,
            Ok(None) => {
                return Err(reject(
                    &ctx,
                    StatusCode::PAYLOAD_TOO_LARGE,
                    format!("file exceeds {} bytes", max_bytes),
                )
                .await)
            }
            Err(e) => {
                let status = e.status();
                let reason = format!("upload interrupted: {}", e.body_text());
                return Err(reject(&ctx, status, reason).await);
            }
        };

        let filename = ctx.media.upload_name(&original, Utc::now());
        if let Err(e) = ctx.media.write(&filename, &data).await {
            return Err(reject(
                &ctx,
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("cannot store upload: {}", e),
            )
            .await);
        }

        db::audit::record(
            &ctx.db_pool,
            "video_upload",
            &format!("file={} bytes={}", filename, data.len()),
        )
        .await;
        info!("Uploaded {} ({} bytes)", filename, data.len());

        return Ok(Json(UploadResponse {
            message: "Video uploaded successfully".to_string(),
            filename,
        }));
    }
}
