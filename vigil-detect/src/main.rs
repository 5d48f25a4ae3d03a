//! Vigil Detect (vigil-detect) - Main entry point
//!
//! Resolves configuration, opens the database, connects to the classifier,
//! then runs the ingestion thread, the detection worker and the HTTP server
//! until Ctrl+C or SIGTERM.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vigil_common::events::EventBus;
use vigil_detect::api::{self, AppContext};
use vigil_detect::classifier::{self, Classifier, ServingClassifier};
use vigil_detect::config::{Cli, Config};
use vigil_detect::db;
use vigil_detect::media::clip::FfmpegClipEncoder;
use vigil_detect::media::MediaStore;
use vigil_detect::notify::{
    MailRelayChannel, NotificationChannel, NotificationDispatcher, TwilioSmsChannel,
};
use vigil_detect::pipeline::{DetectionQueue, DetectionWorker, FfmpegSource, IngestLoop};
use vigil_detect::sse::FrameBroadcaster;
use vigil_detect::state::PipelineContext;

/// Control events buffered per SSE client
const EVENT_BUS_CAPACITY: usize = 100;

/// Frames buffered per live frame client before it skips ahead
const FRAME_BROADCAST_CAPACITY: usize = 4;

/// Timeout for notification transport requests
const NOTIFY_TIMEOUT: Duration = Duration::from_secs(30);

/// How long shutdown waits for the ingestion thread
const INGEST_JOIN_TIMEOUT: Duration = Duration::from_secs(3);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::resolve(&cli).context("Failed to resolve configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                let level = &config.log_level;
                format!(
                    "vigil_detect={level},vigil_common={level},tower_http={level}",
                    level = level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Build identification first, before any slow startup work
    info!(
        "Starting Vigil Detect (vigil-detect) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    info!("Root folder: {}", config.root_folder.display());

    let db_pool = vigil_common::db::init_database(&config.db_path)
        .await
        .context("Failed to initialize database")?;
    let settings = db::settings::load_pipeline_settings(&db_pool)
        .await
        .context("Failed to load runtime settings")?;
    info!("Runtime settings: {:?}", settings);

    // A missing or mismatched classifier is fatal
    let serving = ServingClassifier::connect(&config.classifier)
        .await
        .context("Classifier unavailable")?;
    classifier::validate_input_shape(&serving).context("Classifier rejected")?;
    let classifier: Arc<dyn Classifier> = Arc::new(serving);

    let pipeline = Arc::new(PipelineContext::new(settings, config.frame_rate));
    let queue = Arc::new(DetectionQueue::new(config.queue_capacity));
    let events = EventBus::new(EVENT_BUS_CAPACITY);
    let frames = FrameBroadcaster::new(FRAME_BROADCAST_CAPACITY);
    let media = Arc::new(MediaStore::new(config.uploads_dir.clone()));

    let http = reqwest::Client::builder()
        .timeout(NOTIFY_TIMEOUT)
        .build()
        .context("Failed to build HTTP client")?;
    let email = MailRelayChannel::from_config(&config.email, http.clone())
        .map(|c| Arc::new(c) as Arc<dyn NotificationChannel>);
    let sms = TwilioSmsChannel::from_config(&config.sms, http)
        .map(|c| Arc::new(c) as Arc<dyn NotificationChannel>);
    let dispatcher = Arc::new(NotificationDispatcher::new(
        db_pool.clone(),
        Arc::clone(&media),
        email,
        sms,
    ));

    let worker = DetectionWorker::new(
        Arc::clone(&pipeline),
        db_pool.clone(),
        events.clone(),
        classifier,
        Arc::clone(&media),
        Arc::new(FfmpegClipEncoder::new(config.capture.ffmpeg_path.clone())),
        dispatcher,
    );
    let worker_handle = worker.spawn(Arc::clone(&queue));

    let stop = Arc::new(AtomicBool::new(false));
    let ingest = IngestLoop::new(
        Arc::clone(&pipeline),
        Arc::new(FfmpegSource::new(&config.capture, config.frame_rate)),
        Arc::clone(&queue),
        frames.clone(),
        config.channel_order,
    );
    let ingest_handle = ingest
        .spawn(Arc::clone(&stop))
        .context("Failed to start ingestion thread")?;

    let ctx = AppContext::new(
        pipeline,
        db_pool,
        events,
        frames,
        media,
        config.upload.clone(),
    );
    let served = api::run(ctx, config.port, shutdown_signal()).await;

    // Stop ingestion, then let the worker drain and exit
    stop.store(true, Ordering::Relaxed);
    queue.close();

    if let Err(e) = worker_handle.await {
        warn!("Detection worker ended abnormally: {}", e);
    }

    let joined = tokio::task::spawn_blocking(move || ingest_handle.join());
    match tokio::time::timeout(INGEST_JOIN_TIMEOUT, joined).await {
        Ok(Ok(Ok(()))) => {}
        Ok(_) => warn!("Ingestion thread ended abnormally"),
        Err(_) => warn!("Ingestion thread did not stop in time"),
    }

    served.context("HTTP server failed")?;
    info!("Shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
