//! Snapshot rows

use super::format_timestamp;
use crate::error::Result;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite};
use uuid::Uuid;

pub async fn insert_snapshot(
    db: &Pool<Sqlite>,
    file_name: &str,
    size_bytes: u64,
    at: DateTime<Utc>,
) -> Result<Uuid> {
    let snapshot_id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO snapshots (guid, file_name, size_bytes, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(snapshot_id.to_string())
    .bind(file_name)
    .bind(size_bytes as i64)
    .bind(format_timestamp(at))
    .execute(db)
    .await?;

    Ok(snapshot_id)
}

pub async fn count_snapshots(db: &Pool<Sqlite>) -> Result<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM snapshots")
        .fetch_one(db)
        .await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_common::db::init_memory_database;

    #[tokio::test]
    async fn test_insert_snapshot() {
        let db = init_memory_database().await.unwrap();
        assert_eq!(count_snapshots(&db).await.unwrap(), 0);
        insert_snapshot(&db, "snapshot_1.jpg", 512, Utc::now()).await.unwrap();
        assert_eq!(count_snapshots(&db).await.unwrap(), 1);
    }
}
