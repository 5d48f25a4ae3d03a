//! Database initialization tests
//!
//! First-run creation, reopening an existing file, default settings and
//! the alert/clip cascade.

use vigil_common::db::init::{init_database, init_memory_database, keys};

#[tokio::test]
async fn test_database_creation_when_missing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("nested").join("vigil.db");

    let result = init_database(&db_path).await;

    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing_and_keeps_values() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("vigil.db");

    let pool = init_database(&db_path).await.unwrap();
    sqlx::query("UPDATE settings SET value = '15' WHERE key = ?")
        .bind(keys::COOLDOWN_SECONDS)
        .execute(&pool)
        .await
        .unwrap();
    pool.close().await;

    let pool = init_database(&db_path).await.unwrap();
    let value: String = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(keys::COOLDOWN_SECONDS)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(value, "15", "Reopening must not overwrite stored settings");
}

#[tokio::test]
async fn test_default_settings_initialized() {
    let pool = init_memory_database().await.unwrap();

    let expected = [
        (keys::CLIP_CAPTURE_ENABLED, "false"),
        (keys::CLIP_DURATION_SECONDS, "6.0"),
        (keys::COOLDOWN_SECONDS, "60"),
        (keys::EMAIL_ENABLED, "false"),
        (keys::SMS_ENABLED, "false"),
        (keys::LOGGING_ENABLED, "true"),
    ];

    for (key, default_value) in expected {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(value.as_deref(), Some(default_value), "setting {}", key);
    }

    let cooldown_rows: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM settings WHERE key LIKE 'last_%_sent_at'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(cooldown_rows, 0, "No channel has sent anything on first run");
}

#[tokio::test]
async fn test_null_setting_reset_to_default() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("vigil.db");

    let pool = init_database(&db_path).await.unwrap();
    sqlx::query("UPDATE settings SET value = NULL WHERE key = ?")
        .bind(keys::LOGGING_ENABLED)
        .execute(&pool)
        .await
        .unwrap();
    pool.close().await;

    let pool = init_database(&db_path).await.unwrap();
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(keys::LOGGING_ENABLED)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(value.as_deref(), Some("true"));
}

#[tokio::test]
async fn test_deleting_alert_cascades_to_clip_but_not_notifications() {
    let pool = init_memory_database().await.unwrap();

    sqlx::query(
        "INSERT INTO alerts (guid, created_at, confidence, source, message, updated_at)
         VALUES ('a1', '2024-01-01T00:00:00Z', 0.1, 'webcam', 'm', '2024-01-01T00:00:00Z')",
    )
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO video_clips (guid, alert_guid, file_name, duration_seconds, size_bytes, created_at)
         VALUES ('c1', 'a1', 'clip.mp4', 6.0, 10, '2024-01-01T00:00:00Z')",
    )
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO notifications (guid, alert_guid, channel, recipient, sent_at, outcome)
         VALUES ('n1', 'a1', 'email', 'ops@example.com', '2024-01-01T00:00:00Z', 'sent')",
    )
    .execute(&pool)
    .await
    .unwrap();

    sqlx::query("DELETE FROM alerts WHERE guid = 'a1'")
        .execute(&pool)
        .await
        .unwrap();

    let clips: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM video_clips")
        .fetch_one(&pool)
        .await
        .unwrap();
    let notifications: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notifications")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(clips, 0);
    assert_eq!(notifications, 1);
}
