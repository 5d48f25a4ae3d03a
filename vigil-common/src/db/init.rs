//! Database initialization
//!
//! Creates the database file on first run, applies connection pragmas,
//! creates every table idempotently and seeds default runtime settings.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::{info, warn};

/// Runtime setting keys
pub mod keys {
    pub const CLIP_CAPTURE_ENABLED: &str = "clip_capture_enabled";
    pub const CLIP_DURATION_SECONDS: &str = "clip_duration_seconds";
    pub const COOLDOWN_SECONDS: &str = "cooldown_seconds";
    pub const EMAIL_ENABLED: &str = "email_enabled";
    pub const SMS_ENABLED: &str = "sms_enabled";
    pub const LOGGING_ENABLED: &str = "logging_enabled";
}

/// Open (creating if needed) the database at `db_path` and bring the schema up
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// Single-connection in-memory database with the full schema
///
/// Every connection to `sqlite::memory:` is a distinct database, so the
/// pool is capped at one connection.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create all tables and seed default settings (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;

    create_settings_table(pool).await?;
    create_alerts_table(pool).await?;
    create_video_clips_table(pool).await?;
    create_notifications_table(pool).await?;
    create_snapshots_table(pool).await?;
    create_audit_log_table(pool).await?;

    init_default_settings(pool).await?;

    Ok(())
}

/// Key/value runtime settings, including per-channel cooldown timestamps
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_alerts_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS alerts (
            guid TEXT PRIMARY KEY,
            created_at TEXT NOT NULL,
            confidence REAL NOT NULL CHECK (confidence >= 0.0 AND confidence <= 1.0),
            source TEXT NOT NULL CHECK (source IN ('webcam', 'upload')),
            status TEXT NOT NULL DEFAULT 'new' CHECK (status IN ('new', 'processed')),
            message TEXT NOT NULL,
            read INTEGER NOT NULL DEFAULT 0,
            false_positive INTEGER NOT NULL DEFAULT 0,
            notes TEXT NOT NULL DEFAULT '',
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_alerts_created_at ON alerts(created_at)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_video_clips_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS video_clips (
            guid TEXT PRIMARY KEY,
            alert_guid TEXT NOT NULL REFERENCES alerts(guid) ON DELETE CASCADE,
            file_name TEXT NOT NULL,
            duration_seconds REAL NOT NULL,
            size_bytes INTEGER NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_video_clips_alert ON video_clips(alert_guid)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Notification attempts outlive their alert, so there is no foreign key
async fn create_notifications_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS notifications (
            guid TEXT PRIMARY KEY,
            alert_guid TEXT NOT NULL,
            channel TEXT NOT NULL CHECK (channel IN ('email', 'sms')),
            recipient TEXT NOT NULL,
            sent_at TEXT NOT NULL,
            outcome TEXT NOT NULL CHECK (outcome IN ('sent', 'failed')),
            message TEXT NOT NULL DEFAULT ''
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_notifications_alert ON notifications(alert_guid)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_snapshots_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS snapshots (
            guid TEXT PRIMARY KEY,
            file_name TEXT NOT NULL,
            size_bytes INTEGER NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_audit_log_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS audit_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            action TEXT NOT NULL,
            details TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Seed runtime settings with first-run defaults
///
/// Existing values are kept; NULL values are reset.
async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    ensure_setting(pool, keys::CLIP_CAPTURE_ENABLED, "false").await?;
    ensure_setting(pool, keys::CLIP_DURATION_SECONDS, "6.0").await?;
    ensure_setting(pool, keys::COOLDOWN_SECONDS, "60").await?;
    ensure_setting(pool, keys::EMAIL_ENABLED, "false").await?;
    ensure_setting(pool, keys::SMS_ENABLED, "false").await?;
    ensure_setting(pool, keys::LOGGING_ENABLED, "true").await?;

    Ok(())
}

async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    let existing: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?;

    match existing {
        None => {
            sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(default_value)
                .execute(pool)
                .await?;
            info!("Initialized setting '{}' with default value: {}", key, default_value);
        }
        Some(None) => {
            sqlx::query("UPDATE settings SET value = ? WHERE key = ?")
                .bind(default_value)
                .bind(key)
                .execute(pool)
                .await?;
            warn!("Setting '{}' was NULL, reset to default: {}", key, default_value);
        }
        Some(Some(_)) => {}
    }

    Ok(())
}
