//! Control channel
//!
//! `POST /api/control` accepts one typed [`ControlEvent`]. Each event is
//! validated completely before anything is changed. Rejected events are
//! audited as `<action>_failed` and answered with 400, 404 or 409.

use crate::api::handlers::{error_response, ApiError};
use crate::api::server::AppContext;
use crate::db;
use crate::db::alerts::AlertUpdate;
use crate::error::{Error, Result};
use crate::media::is_upload_name;
use crate::pipeline::render::{encode_jpeg, SNAPSHOT_JPEG_QUALITY};
use crate::pipeline::source::SourceSelection;
use axum::{body::Bytes, extract::State, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;
use vigil_common::db::models::{AlertRecord, AlertStatus, Channel, PipelineSettings, SourceKind};
use vigil_common::events::VigilEvent;

/// Longest accepted clip duration in seconds
pub const MAX_CLIP_DURATION_SECONDS: f64 = 1800.0;

/// Longest accepted cooldown in seconds
pub const MAX_COOLDOWN_SECONDS: f64 = 300.0;

/// Operator actions
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlEvent {
    SetSource {
        source: SourceKind,
        /// Uploaded file name; defaults to the most recent upload
        #[serde(default)]
        upload_id: Option<String>,
    },
    ToggleNotifications {
        channel: Channel,
        enabled: bool,
    },
    ToggleClipCapture {
        enabled: bool,
    },
    ToggleLogging {
        enabled: bool,
    },
    SetClipDuration {
        duration: f64,
    },
    SetCooldown {
        cooldown: f64,
    },
    CaptureSnapshot,
    UpdateAlert {
        alert_id: Uuid,
        #[serde(default)]
        status: Option<AlertStatus>,
        #[serde(default)]
        notes: Option<String>,
        #[serde(default)]
        read: Option<bool>,
        #[serde(default)]
        false_positive: Option<bool>,
    },
    ClearAlerts,
    LogError {
        #[serde(default = "default_error_action")]
        action: String,
        #[serde(default = "default_error_details")]
        details: String,
    },
}

fn default_error_action() -> String {
    "unknown_error".to_string()
}

fn default_error_details() -> String {
    "No details provided".to_string()
}

impl ControlEvent {
    /// Audit action recorded when this event is rejected (minus `_failed`)
    pub fn audit_action(&self) -> &'static str {
        match self {
            ControlEvent::SetSource { .. } => "set_source",
            ControlEvent::ToggleNotifications { .. } => "toggle_notifications",
            ControlEvent::ToggleClipCapture { .. } => "toggle_clip",
            ControlEvent::ToggleLogging { .. } => "toggle_logging",
            ControlEvent::SetClipDuration { .. } => "set_clip_duration",
            ControlEvent::SetCooldown { .. } => "set_cooldown",
            ControlEvent::CaptureSnapshot => "snapshot",
            ControlEvent::UpdateAlert { .. } => "update_alert",
            ControlEvent::ClearAlerts => "clear_alerts",
            ControlEvent::LogError { .. } => "log_error",
        }
    }
}

/// Audit action for a payload that did not deserialize
fn action_for_type(event_type: Option<&str>) -> &'static str {
    match event_type {
        Some("set_source") => "set_source",
        Some("toggle_notifications") => "toggle_notifications",
        Some("toggle_clip_capture") => "toggle_clip",
        Some("toggle_logging") => "toggle_logging",
        Some("set_clip_duration") => "set_clip_duration",
        Some("set_cooldown") => "set_cooldown",
        Some("capture_snapshot") => "snapshot",
        Some("update_alert") => "update_alert",
        Some("clear_alerts") => "clear_alerts",
        Some("log_error") => "log_error",
        _ => "control_event",
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ControlResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<PipelineSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert: Option<AlertRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ControlResponse {
    fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            ..Self::default()
        }
    }

    fn with_settings(settings: PipelineSettings) -> Self {
        Self {
            settings: Some(settings),
            ..Self::ok()
        }
    }
}

/// POST /api/control
pub async fn handle_control(
    State(ctx): State<AppContext>,
    body: Bytes,
) -> std::result::Result<Json<ControlResponse>, ApiError> {
    let event = match parse_event(&body) {
        Ok(event) => event,
        Err((action, error)) => {
            warn!("Rejected control event: {}", error);
            db::audit::record(&ctx.db_pool, &format!("{}_failed", action), &error.to_string())
                .await;
            return Err(error_response(&error));
        }
    };

    match apply(&ctx, event.clone()).await {
        Ok(response) => Ok(Json(response)),
        Err(e) => {
            warn!("Control event {} failed: {}", event.audit_action(), e);
            db::audit::record(
                &ctx.db_pool,
                &format!("{}_failed", event.audit_action()),
                &e.to_string(),
            )
            .await;
            Err(error_response(&e))
        }
    }
}

/// Decode a request body; on failure, the audit action and the error
fn parse_event(body: &[u8]) -> std::result::Result<ControlEvent, (&'static str, Error)> {
    let payload: Value = serde_json::from_slice(body).map_err(|e| {
        (
            action_for_type(None),
            Error::InvalidInput(format!("control event is not JSON: {}", e)),
        )
    })?;

    serde_json::from_value(payload.clone()).map_err(|e| {
        (
            action_for_type(payload.get("type").and_then(Value::as_str)),
            Error::InvalidInput(format!("malformed control event: {}", e)),
        )
    })
}

/// Validate and apply one event
pub async fn apply(ctx: &AppContext, event: ControlEvent) -> Result<ControlResponse> {
    match event {
        ControlEvent::SetSource { source, upload_id } => set_source(ctx, source, upload_id).await,

        ControlEvent::ToggleNotifications { channel, enabled } => {
            let settings = change_settings(ctx, |s| match channel {
                Channel::Email => s.email_enabled = enabled,
                Channel::Sms => s.sms_enabled = enabled,
            })
            .await?;
            db::audit::record(
                &ctx.db_pool,
                &format!("toggle_{}", channel),
                &format!("enabled={}", enabled),
            )
            .await;
            Ok(ControlResponse::with_settings(settings))
        }

        ControlEvent::ToggleClipCapture { enabled } => {
            let settings = change_settings(ctx, |s| s.clip_capture_enabled = enabled).await?;
            db::audit::record(&ctx.db_pool, "toggle_clip", &format!("enabled={}", enabled)).await;
            Ok(ControlResponse::with_settings(settings))
        }

        ControlEvent::ToggleLogging { enabled } => {
            let settings = change_settings(ctx, |s| s.logging_enabled = enabled).await?;
            db::audit::record(&ctx.db_pool, "toggle_logging", &format!("enabled={}", enabled))
                .await;
            Ok(ControlResponse::with_settings(settings))
        }

        ControlEvent::SetClipDuration { duration } => {
            if !duration.is_finite() || duration <= 0.0 || duration > MAX_CLIP_DURATION_SECONDS {
                return Err(Error::InvalidInput(format!(
                    "clip duration must be in (0, {}] seconds, got {}",
                    MAX_CLIP_DURATION_SECONDS, duration
                )));
            }
            let settings = change_settings(ctx, |s| s.clip_duration_seconds = duration).await?;
            db::audit::record(
                &ctx.db_pool,
                "set_clip_duration",
                &format!("duration={}", duration),
            )
            .await;
            Ok(ControlResponse::with_settings(settings))
        }

        ControlEvent::SetCooldown { cooldown } => {
            if !cooldown.is_finite() || !(0.0..=MAX_COOLDOWN_SECONDS).contains(&cooldown) {
                return Err(Error::InvalidInput(format!(
                    "cooldown must be in [0, {}] seconds, got {}",
                    MAX_COOLDOWN_SECONDS, cooldown
                )));
            }
            let seconds = cooldown as u32;
            let settings = change_settings(ctx, |s| s.cooldown_seconds = seconds).await?;
            db::audit::record(&ctx.db_pool, "set_cooldown", &format!("cooldown={}", seconds))
                .await;
            Ok(ControlResponse::with_settings(settings))
        }

        ControlEvent::CaptureSnapshot => capture_snapshot(ctx).await,

        ControlEvent::UpdateAlert {
            alert_id,
            status,
            notes,
            read,
            false_positive,
        } => {
            if status == Some(AlertStatus::Dismissed) {
                return dismiss_alert(ctx, alert_id).await;
            }

            let update = AlertUpdate {
                status,
                notes,
                read,
                false_positive,
            };
            if update.is_empty() {
                return Err(Error::InvalidInput("update_alert carries no changes".into()));
            }

            let alert = db::alerts::update_alert(&ctx.db_pool, alert_id, &update).await?;
            ctx.events.emit_lossy(VigilEvent::AlertUpdated {
                alert: alert.clone(),
            });
            db::audit::record(&ctx.db_pool, "update_alert", &format!("alert_id={}", alert_id))
                .await;
            Ok(ControlResponse {
                alert: Some(alert),
                ..ControlResponse::ok()
            })
        }

        ControlEvent::ClearAlerts => {
            let clips = db::alerts::clear_alerts(&ctx.db_pool).await?;
            delete_clip_files(ctx, &clips).await;
            ctx.events.emit_lossy(VigilEvent::AlertsCleared {
                timestamp: Utc::now(),
            });
            db::audit::record(
                &ctx.db_pool,
                "clear_alerts",
                &format!("clips_removed={}", clips.len()),
            )
            .await;
            info!("Cleared all alerts ({} clips removed)", clips.len());
            Ok(ControlResponse::ok())
        }

        ControlEvent::LogError { action, details } => {
            warn!("Client error reported: {}: {}", action, details);
            db::audit::log_action(&ctx.db_pool, &action, &details).await?;
            Ok(ControlResponse::ok())
        }
    }
}

/// Persist a settings change, then publish it to the pipeline and clients
///
/// The change is computed on a copy; a persistence failure leaves the live
/// settings untouched. Changes are applied one at a time.
async fn change_settings<F>(ctx: &AppContext, mutate: F) -> Result<PipelineSettings>
where
    F: Fn(&mut PipelineSettings),
{
    let _guard = ctx.settings_lock.lock().await;

    let mut next = ctx.pipeline.settings();
    mutate(&mut next);
    db::settings::save_pipeline_settings(&ctx.db_pool, &next).await?;

    let settings = ctx.pipeline.update_settings(|s| mutate(s));
    ctx.events.emit_lossy(VigilEvent::settings_changed(settings.clone()));
    Ok(settings)
}

async fn set_source(
    ctx: &AppContext,
    source: SourceKind,
    upload_id: Option<String>,
) -> Result<ControlResponse> {
    let (selection, upload_id) = match source {
        SourceKind::Webcam => (SourceSelection::Webcam, None),
        SourceKind::Upload => {
            let name = match upload_id {
                Some(name) => name,
                None => ctx
                    .media
                    .latest_upload(&ctx.upload.allowed_extensions)
                    .ok_or_else(|| Error::NotFound("no uploaded video available".into()))?,
            };
            let path = ctx.media.path_for(&name)?;
            if !is_upload_name(&name, &ctx.upload.allowed_extensions) || !path.is_file() {
                return Err(Error::NotFound(format!("uploaded video {}", name)));
            }
            (SourceSelection::Upload(path), Some(name))
        }
    };

    ctx.pipeline.request_source(selection);
    ctx.events.emit_lossy(VigilEvent::SourceChanged {
        source,
        upload_id: upload_id.clone(),
        timestamp: Utc::now(),
    });
    db::audit::record(
        &ctx.db_pool,
        "set_source",
        &format!(
            "source={} upload_id={}",
            source,
            upload_id.as_deref().unwrap_or("-")
        ),
    )
    .await;
    info!("Source switch requested: {}", source);

    Ok(ControlResponse::ok())
}

async fn capture_snapshot(ctx: &AppContext) -> Result<ControlResponse> {
    let frame = ctx
        .pipeline
        .latest_frame()
        .ok_or_else(|| Error::Conflict("no frame available for snapshot".into()))?;

    let image = frame.image.clone();
    let bytes = tokio::task::spawn_blocking(move || encode_jpeg(&image, SNAPSHOT_JPEG_QUALITY))
        .await
        .map_err(|e| Error::Internal(format!("snapshot encoder task failed: {}", e)))??;

    let now = Utc::now();
    let name = ctx.media.snapshot_name(now);
    ctx.media.write(&name, &bytes).await?;
    db::snapshots::insert_snapshot(&ctx.db_pool, &name, bytes.len() as u64, now).await?;

    let url = ctx.media.url_for(&name);
    ctx.events.emit_lossy(VigilEvent::SnapshotSaved {
        url: url.clone(),
        timestamp: now,
    });
    db::audit::record(&ctx.db_pool, "snapshot", &format!("file={}", name)).await;
    info!("Snapshot saved: {}", name);

    Ok(ControlResponse {
        url: Some(url),
        ..ControlResponse::ok()
    })
}

async fn dismiss_alert(ctx: &AppContext, alert_id: Uuid) -> Result<ControlResponse> {
    let clips = db::alerts::delete_alert(&ctx.db_pool, alert_id).await?;
    delete_clip_files(ctx, &clips).await;

    ctx.events.emit_lossy(VigilEvent::AlertDismissed {
        alert_id,
        timestamp: Utc::now(),
    });
    db::audit::record(&ctx.db_pool, "dismiss_alert", &format!("alert_id={}", alert_id)).await;
    info!("Alert {} dismissed", alert_id);

    Ok(ControlResponse::ok())
}

async fn delete_clip_files(ctx: &AppContext, clips: &[String]) {
    for clip in clips {
        if let Err(e) = ctx.media.delete(clip).await {
            warn!("Failed to delete clip {}: {}", clip, e);
        }
    }
}
