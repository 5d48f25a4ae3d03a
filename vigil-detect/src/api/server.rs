//! HTTP server setup and routing

use super::{control, handlers, sse, upload};
use crate::error::{Error, Result};
use crate::media::{MediaStore, UPLOADS_URL_PREFIX};
use crate::sse::FrameBroadcaster;
use crate::state::PipelineContext;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use sqlx::{Pool, Sqlite};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;
use vigil_common::config::UploadConfig;
use vigil_common::events::EventBus;

/// Multipart framing allowance on top of the upload size cap, so oversized
/// files are measured and rejected by the handler rather than the body limit
const UPLOAD_BODY_SLACK: usize = 64 * 1024;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub pipeline: Arc<PipelineContext>,
    pub db_pool: Pool<Sqlite>,
    pub events: EventBus,
    pub frames: FrameBroadcaster,
    pub media: Arc<MediaStore>,
    pub upload: Arc<UploadConfig>,
    /// Serializes settings changes so the stored copy matches the live one
    pub settings_lock: Arc<Mutex<()>>,
}

impl AppContext {
    pub fn new(
        pipeline: Arc<PipelineContext>,
        db_pool: Pool<Sqlite>,
        events: EventBus,
        frames: FrameBroadcaster,
        media: Arc<MediaStore>,
        upload: UploadConfig,
    ) -> Self {
        Self {
            pipeline,
            db_pool,
            events,
            frames,
            media,
            upload: Arc::new(upload),
            settings_lock: Arc::new(Mutex::new(())),
        }
    }
}

/// Build the router with every route and layer
pub fn create_router(ctx: AppContext) -> Router {
    let body_limit = ctx.upload.max_bytes.saturating_add(UPLOAD_BODY_SLACK);
    let uploads = ServeDir::new(ctx.media.root().to_path_buf());

    Router::new()
        .route("/health", get(handlers::health))
        .route("/build_info", get(handlers::get_build_info))
        // Control channel
        .route("/api/control", post(control::handle_control))
        .route(
            "/api/upload",
            post(upload::upload_video).layer(DefaultBodyLimit::max(body_limit)),
        )
        // Queries
        .route("/api/alerts", get(handlers::list_alerts))
        .route(
            "/api/alerts/:alert_id/notifications",
            get(handlers::list_alert_notifications),
        )
        .route("/api/settings", get(handlers::get_settings))
        // SSE
        .route("/events", get(sse::event_stream))
        .route("/frames", get(sse::frame_stream))
        // Clips, snapshots and uploaded videos
        .nest_service(UPLOADS_URL_PREFIX, uploads)
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serve until `shutdown` resolves
pub async fn run<F>(ctx: AppContext, port: u16, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(ctx);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))?;

    info!("HTTP server stopped");
    Ok(())
}
