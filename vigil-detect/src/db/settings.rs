//! Settings database access
//!
//! Runtime pipeline settings and per-channel cooldown timestamps, stored in
//! the `settings` key/value table.

use super::{format_timestamp, parse_timestamp};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::{Executor, Pool, Sqlite};
use std::str::FromStr;
use vigil_common::db::init::keys;
use vigil_common::db::models::{Channel, PipelineSettings};

/// Load runtime settings, falling back to defaults for missing keys
pub async fn load_pipeline_settings(db: &Pool<Sqlite>) -> Result<PipelineSettings> {
    let defaults = PipelineSettings::default();

    Ok(PipelineSettings {
        clip_capture_enabled: get_setting(db, keys::CLIP_CAPTURE_ENABLED)
            .await?
            .unwrap_or(defaults.clip_capture_enabled),
        clip_duration_seconds: get_setting(db, keys::CLIP_DURATION_SECONDS)
            .await?
            .unwrap_or(defaults.clip_duration_seconds),
        cooldown_seconds: get_setting(db, keys::COOLDOWN_SECONDS)
            .await?
            .unwrap_or(defaults.cooldown_seconds),
        email_enabled: get_setting(db, keys::EMAIL_ENABLED)
            .await?
            .unwrap_or(defaults.email_enabled),
        sms_enabled: get_setting(db, keys::SMS_ENABLED)
            .await?
            .unwrap_or(defaults.sms_enabled),
        logging_enabled: get_setting(db, keys::LOGGING_ENABLED)
            .await?
            .unwrap_or(defaults.logging_enabled),
    })
}

/// Persist every runtime setting in one transaction
pub async fn save_pipeline_settings(db: &Pool<Sqlite>, settings: &PipelineSettings) -> Result<()> {
    let mut tx = db.begin().await?;
    set_setting(&mut *tx, keys::CLIP_CAPTURE_ENABLED, settings.clip_capture_enabled).await?;
    set_setting(&mut *tx, keys::CLIP_DURATION_SECONDS, settings.clip_duration_seconds).await?;
    set_setting(&mut *tx, keys::COOLDOWN_SECONDS, settings.cooldown_seconds).await?;
    set_setting(&mut *tx, keys::EMAIL_ENABLED, settings.email_enabled).await?;
    set_setting(&mut *tx, keys::SMS_ENABLED, settings.sms_enabled).await?;
    set_setting(&mut *tx, keys::LOGGING_ENABLED, settings.logging_enabled).await?;
    tx.commit().await?;
    Ok(())
}

/// Last successful send on `channel`, if any
pub async fn get_last_sent(db: &Pool<Sqlite>, channel: Channel) -> Result<Option<DateTime<Utc>>> {
    match get_setting::<String>(db, channel.cooldown_key()).await? {
        Some(value) if !value.is_empty() => {
            parse_timestamp(channel.cooldown_key(), &value).map(Some)
        }
        _ => Ok(None),
    }
}

pub async fn set_last_sent(db: &Pool<Sqlite>, channel: Channel, at: DateTime<Utc>) -> Result<()> {
    set_setting(db, channel.cooldown_key(), format_timestamp(at)).await
}

/// Generic setting getter
///
/// Returns None if the key doesn't exist or holds NULL.
pub async fn get_setting<T: FromStr>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>> {
    let value: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(db)
            .await?;

    match value.flatten() {
        Some(s) => match s.parse::<T>() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) => Err(Error::Config(format!(
                "Failed to parse setting '{}' value: {}",
                key, s
            ))),
        },
        None => Ok(None),
    }
}

/// Generic setting setter (upsert)
pub async fn set_setting<'e, E, T>(db: E, key: &str, value: T) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
    T: ToString,
{
    let value_str = value.to_string();

    sqlx::query(
        r#"
        INSERT INTO settings (key, value, updated_at)
        VALUES (?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(key)
    .bind(value_str)
    .execute(db)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use vigil_common::db::init_memory_database;

    #[tokio::test]
    async fn test_first_run_defaults() {
        let db = init_memory_database().await.unwrap();
        let settings = load_pipeline_settings(&db).await.unwrap();
        assert_eq!(settings, PipelineSettings::default());
    }

    #[tokio::test]
    async fn test_settings_round_trip() {
        let db = init_memory_database().await.unwrap();
        let changed = PipelineSettings {
            clip_capture_enabled: true,
            clip_duration_seconds: 12.5,
            cooldown_seconds: 0,
            email_enabled: true,
            sms_enabled: false,
            logging_enabled: false,
        };

        save_pipeline_settings(&db, &changed).await.unwrap();
        assert_eq!(load_pipeline_settings(&db).await.unwrap(), changed);
    }

    #[tokio::test]
    async fn test_channel_cooldown_timestamps_are_independent() {
        let db = init_memory_database().await.unwrap();
        assert!(get_last_sent(&db, Channel::Email).await.unwrap().is_none());

        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        set_last_sent(&db, Channel::Email, at).await.unwrap();

        assert_eq!(get_last_sent(&db, Channel::Email).await.unwrap(), Some(at));
        assert!(get_last_sent(&db, Channel::Sms).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_save_leaves_stored_settings_untouched() {
        let db = init_memory_database().await.unwrap();
        // Reject writes to the last key so the save fails midway
        sqlx::query(
            r#"
            CREATE TRIGGER reject_logging BEFORE UPDATE ON settings
            WHEN NEW.key = 'logging_enabled'
            BEGIN SELECT RAISE(ABORT, 'read-only'); END
            "#,
        )
        .execute(&db)
        .await
        .unwrap();

        let changed = PipelineSettings {
            clip_capture_enabled: true,
            email_enabled: true,
            logging_enabled: false,
            ..PipelineSettings::default()
        };
        assert!(save_pipeline_settings(&db, &changed).await.is_err());
        assert_eq!(load_pipeline_settings(&db).await.unwrap(), PipelineSettings::default());
    }

    #[tokio::test]
    async fn test_unparseable_value_is_an_error() {
        let db = init_memory_database().await.unwrap();
        set_setting(&db, keys::COOLDOWN_SECONDS, "soon").await.unwrap();
        assert!(load_pipeline_settings(&db).await.is_err());
    }
}
