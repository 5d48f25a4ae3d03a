//! Alert persistence
//!
//! Alerts are created by the detection worker and mutated by operators.
//! `dismissed` is never stored; dismissal deletes the row, and its clip
//! rows go with it (`ON DELETE CASCADE`).

use super::{format_timestamp, parse_guid, parse_timestamp};
use crate::error::{Error, Result};
use crate::media::UPLOADS_URL_PREFIX;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};
use uuid::Uuid;
use vigil_common::db::models::{AlertRecord, AlertStatus, SourceKind};

/// Alerts returned by [`list_recent_alerts`] by default
pub const RECENT_ALERTS_LIMIT: i64 = 20;

/// Longest accepted operator note
pub const MAX_NOTES_CHARS: usize = 500;

/// Operator changes to an alert; `None` fields are left as they are
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlertUpdate {
    pub status: Option<AlertStatus>,
    pub notes: Option<String>,
    pub read: Option<bool>,
    pub false_positive: Option<bool>,
}

impl AlertUpdate {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.notes.is_none()
            && self.read.is_none()
            && self.false_positive.is_none()
    }
}

const SELECT_ALERT: &str = r#"
    SELECT a.guid, a.created_at, a.confidence, a.source, a.status, a.message,
           a.read, a.false_positive, a.notes,
           (SELECT c.file_name FROM video_clips c
             WHERE c.alert_guid = a.guid
             ORDER BY c.created_at DESC LIMIT 1) AS clip_file
    FROM alerts a
"#;

fn alert_from_row(row: &SqliteRow) -> Result<AlertRecord> {
    let guid: String = row.get("guid");
    let created_at: String = row.get("created_at");
    let source: String = row.get("source");
    let status: String = row.get("status");
    let clip_file: Option<String> = row.get("clip_file");

    Ok(AlertRecord {
        alert_id: parse_guid(&guid)?,
        timestamp: parse_timestamp("created_at", &created_at)?,
        confidence: row.get("confidence"),
        source: source.parse().map_err(Error::Internal)?,
        status: status.parse().map_err(Error::Internal)?,
        message: row.get("message"),
        read: row.get::<i64, _>("read") != 0,
        false_positive: row.get::<i64, _>("false_positive") != 0,
        notes: row.get("notes"),
        clip_url: clip_file.map(|name| format!("{}/{}", UPLOADS_URL_PREFIX, name)),
    })
}

/// Insert a new alert with status `new`
pub async fn create_alert(
    db: &Pool<Sqlite>,
    confidence: f64,
    source: SourceKind,
    message: &str,
    at: DateTime<Utc>,
) -> Result<AlertRecord> {
    let alert_id = Uuid::new_v4();
    let created_at = format_timestamp(at);

    sqlx::query(
        r#"
        INSERT INTO alerts (guid, created_at, confidence, source, status, message,
                            read, false_positive, notes, updated_at)
        VALUES (?, ?, ?, ?, 'new', ?, 0, 0, '', ?)
        "#,
    )
    .bind(alert_id.to_string())
    .bind(&created_at)
    .bind(confidence)
    .bind(source.as_str())
    .bind(message)
    .bind(&created_at)
    .execute(db)
    .await?;

    get_alert(db, alert_id).await
}

pub async fn get_alert(db: &Pool<Sqlite>, alert_id: Uuid) -> Result<AlertRecord> {
    let sql = format!("{} WHERE a.guid = ?", SELECT_ALERT);
    let row = sqlx::query(&sql)
        .bind(alert_id.to_string())
        .fetch_optional(db)
        .await?
        .ok_or_else(|| Error::NotFound(format!("alert {}", alert_id)))?;

    alert_from_row(&row)
}

/// Most recent alerts, newest first
pub async fn list_recent_alerts(db: &Pool<Sqlite>, limit: i64) -> Result<Vec<AlertRecord>> {
    let sql = format!("{} ORDER BY a.created_at DESC LIMIT ?", SELECT_ALERT);
    let rows = sqlx::query(&sql).bind(limit).fetch_all(db).await?;

    rows.iter().map(alert_from_row).collect()
}

/// Apply operator changes; id, timestamp and confidence never change
///
/// `status = dismissed` is not an update; callers route it to [`delete_alert`].
pub async fn update_alert(
    db: &Pool<Sqlite>,
    alert_id: Uuid,
    update: &AlertUpdate,
) -> Result<AlertRecord> {
    if update.status == Some(AlertStatus::Dismissed) {
        return Err(Error::InvalidInput(
            "dismissed alerts are deleted, not updated".into(),
        ));
    }
    if let Some(notes) = &update.notes {
        if notes.chars().count() > MAX_NOTES_CHARS {
            return Err(Error::InvalidInput(format!(
                "notes longer than {} characters",
                MAX_NOTES_CHARS
            )));
        }
    }

    let result = sqlx::query(
        r#"
        UPDATE alerts SET
            status = COALESCE(?, status),
            notes = COALESCE(?, notes),
            read = COALESCE(?, read),
            false_positive = COALESCE(?, false_positive),
            updated_at = ?
        WHERE guid = ?
        "#,
    )
    .bind(update.status.map(|s| s.as_str()))
    .bind(update.notes.as_deref())
    .bind(update.read)
    .bind(update.false_positive)
    .bind(format_timestamp(Utc::now()))
    .bind(alert_id.to_string())
    .execute(db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("alert {}", alert_id)));
    }

    get_alert(db, alert_id).await
}

/// Delete one alert, returning the clip files it referenced
pub async fn delete_alert(db: &Pool<Sqlite>, alert_id: Uuid) -> Result<Vec<String>> {
    let mut tx = db.begin().await?;

    let clip_files: Vec<String> =
        sqlx::query_scalar("SELECT file_name FROM video_clips WHERE alert_guid = ?")
            .bind(alert_id.to_string())
            .fetch_all(&mut *tx)
            .await?;

    sqlx::query("DELETE FROM video_clips WHERE alert_guid = ?")
        .bind(alert_id.to_string())
        .execute(&mut *tx)
        .await?;

    let result = sqlx::query("DELETE FROM alerts WHERE guid = ?")
        .bind(alert_id.to_string())
        .execute(&mut *tx)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("alert {}", alert_id)));
    }

    tx.commit().await?;
    Ok(clip_files)
}

/// Delete every alert, returning all clip files they referenced
pub async fn clear_alerts(db: &Pool<Sqlite>) -> Result<Vec<String>> {
    let mut tx = db.begin().await?;

    let clip_files: Vec<String> = sqlx::query_scalar("SELECT file_name FROM video_clips")
        .fetch_all(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM video_clips").execute(&mut *tx).await?;
    sqlx::query("DELETE FROM alerts").execute(&mut *tx).await?;

    tx.commit().await?;
    Ok(clip_files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use vigil_common::db::init_memory_database;
    use vigil_common::events::ALERT_MESSAGE;

    #[tokio::test]
    async fn test_create_and_get() {
        let db = init_memory_database().await.unwrap();
        let at = Utc::now();

        let alert = create_alert(&db, 0.21, SourceKind::Webcam, ALERT_MESSAGE, at)
            .await
            .unwrap();
        assert_eq!(alert.status, AlertStatus::New);
        assert!(!alert.read && !alert.false_positive);
        assert_eq!(alert.notes, "");
        assert!(alert.clip_url.is_none());

        let fetched = get_alert(&db, alert.alert_id).await.unwrap();
        assert_eq!(fetched, alert);
    }

    #[tokio::test]
    async fn test_update_to_processed_keeps_identity() {
        let db = init_memory_database().await.unwrap();
        let created = create_alert(&db, 0.3, SourceKind::Upload, ALERT_MESSAGE, Utc::now())
            .await
            .unwrap();

        let update = AlertUpdate {
            status: Some(AlertStatus::Processed),
            notes: Some("X".to_string()),
            ..AlertUpdate::default()
        };
        update_alert(&db, created.alert_id, &update).await.unwrap();

        let fetched = get_alert(&db, created.alert_id).await.unwrap();
        assert_eq!(fetched.status, AlertStatus::Processed);
        assert_eq!(fetched.notes, "X");
        assert_eq!(fetched.alert_id, created.alert_id);
        assert_eq!(fetched.timestamp, created.timestamp);
        assert_eq!(fetched.confidence, created.confidence);
        assert!(!fetched.read);
    }

    #[tokio::test]
    async fn test_update_validation() {
        let db = init_memory_database().await.unwrap();
        let created = create_alert(&db, 0.3, SourceKind::Webcam, ALERT_MESSAGE, Utc::now())
            .await
            .unwrap();

        let too_long = AlertUpdate {
            notes: Some("n".repeat(MAX_NOTES_CHARS + 1)),
            ..AlertUpdate::default()
        };
        assert!(matches!(
            update_alert(&db, created.alert_id, &too_long).await,
            Err(Error::InvalidInput(_))
        ));

        let dismissed = AlertUpdate {
            status: Some(AlertStatus::Dismissed),
            ..AlertUpdate::default()
        };
        assert!(update_alert(&db, created.alert_id, &dismissed).await.is_err());

        let flags = AlertUpdate {
            read: Some(true),
            ..AlertUpdate::default()
        };
        assert!(matches!(
            update_alert(&db, Uuid::new_v4(), &flags).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_recent_alerts_newest_first_and_limited() {
        let db = init_memory_database().await.unwrap();
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
        for i in 0..25 {
            create_alert(
                &db,
                0.1,
                SourceKind::Webcam,
                ALERT_MESSAGE,
                start + Duration::seconds(i),
            )
            .await
            .unwrap();
        }

        let recent = list_recent_alerts(&db, RECENT_ALERTS_LIMIT).await.unwrap();
        assert_eq!(recent.len(), 20);
        assert!(recent.windows(2).all(|w| w[0].timestamp > w[1].timestamp));
        assert_eq!(recent[0].timestamp, start + Duration::seconds(24));
    }

    #[tokio::test]
    async fn test_delete_and_clear_return_clip_files() {
        let db = init_memory_database().await.unwrap();
        let a = create_alert(&db, 0.1, SourceKind::Webcam, ALERT_MESSAGE, Utc::now())
            .await
            .unwrap();
        let b = create_alert(&db, 0.2, SourceKind::Webcam, ALERT_MESSAGE, Utc::now())
            .await
            .unwrap();
        crate::db::clips::insert_clip(&db, a.alert_id, "clip_a.mp4", 6.0, 10, Utc::now())
            .await
            .unwrap();
        crate::db::clips::insert_clip(&db, b.alert_id, "clip_b.mp4", 6.0, 10, Utc::now())
            .await
            .unwrap();

        assert_eq!(
            get_alert(&db, a.alert_id).await.unwrap().clip_url.as_deref(),
            Some("/uploads/clip_a.mp4")
        );

        assert_eq!(delete_alert(&db, a.alert_id).await.unwrap(), vec!["clip_a.mp4"]);
        assert!(matches!(
            get_alert(&db, a.alert_id).await,
            Err(Error::NotFound(_))
        ));
        assert!(delete_alert(&db, a.alert_id).await.is_err());

        assert_eq!(clear_alerts(&db).await.unwrap(), vec!["clip_b.mp4"]);
        assert!(list_recent_alerts(&db, 20).await.unwrap().is_empty());
    }
}
