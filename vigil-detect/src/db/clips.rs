//! Alert clip rows

use super::format_timestamp;
use crate::error::Result;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite};
use uuid::Uuid;

pub async fn insert_clip(
    db: &Pool<Sqlite>,
    alert_id: Uuid,
    file_name: &str,
    duration_seconds: f64,
    size_bytes: u64,
    at: DateTime<Utc>,
) -> Result<Uuid> {
    let clip_id = Uuid::new_v4();

    sqlx::query(
        r#"
        INSERT INTO video_clips (guid, alert_guid, file_name, duration_seconds, size_bytes, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(clip_id.to_string())
    .bind(alert_id.to_string())
    .bind(file_name)
    .bind(duration_seconds)
    .bind(size_bytes as i64)
    .bind(format_timestamp(at))
    .execute(db)
    .await?;

    Ok(clip_id)
}

/// Forget a clip whose file has been deleted
pub async fn remove_clip(db: &Pool<Sqlite>, file_name: &str) -> Result<u64> {
    let result = sqlx::query("DELETE FROM video_clips WHERE file_name = ?")
        .bind(file_name)
        .execute(db)
        .await?;
    Ok(result.rows_affected())
}

pub async fn clip_files_for_alert(db: &Pool<Sqlite>, alert_id: Uuid) -> Result<Vec<String>> {
    let files = sqlx::query_scalar(
        "SELECT file_name FROM video_clips WHERE alert_guid = ? ORDER BY created_at",
    )
    .bind(alert_id.to_string())
    .fetch_all(db)
    .await?;
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::alerts::create_alert;
    use vigil_common::db::init_memory_database;
    use vigil_common::db::models::SourceKind;

    #[tokio::test]
    async fn test_insert_and_remove() {
        let db = init_memory_database().await.unwrap();
        let alert = create_alert(&db, 0.2, SourceKind::Webcam, "x", Utc::now())
            .await
            .unwrap();

        insert_clip(&db, alert.alert_id, "clip_1.mp4", 6.0, 2048, Utc::now())
            .await
            .unwrap();
        assert_eq!(
            clip_files_for_alert(&db, alert.alert_id).await.unwrap(),
            vec!["clip_1.mp4"]
        );

        assert_eq!(remove_clip(&db, "clip_1.mp4").await.unwrap(), 1);
        assert!(clip_files_for_alert(&db, alert.alert_id).await.unwrap().is_empty());
        assert_eq!(remove_clip(&db, "clip_1.mp4").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_clip_requires_existing_alert() {
        let db = init_memory_database().await.unwrap();
        let orphan = insert_clip(&db, Uuid::new_v4(), "clip_x.mp4", 6.0, 1, Utc::now()).await;
        assert!(orphan.is_err());
    }
}
