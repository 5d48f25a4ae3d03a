//! Audit log
//!
//! Every control action, rejected request, upload, alert creation and
//! dismissal leaves one row here.

use super::{format_timestamp, parse_timestamp};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Pool, Row, Sqlite};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub id: i64,
    pub action: String,
    pub details: String,
    pub created_at: DateTime<Utc>,
}

pub async fn log_action(db: &Pool<Sqlite>, action: &str, details: &str) -> Result<()> {
    sqlx::query("INSERT INTO audit_log (action, details, created_at) VALUES (?, ?, ?)")
        .bind(action)
        .bind(details)
        .bind(format_timestamp(Utc::now()))
        .execute(db)
        .await?;
    Ok(())
}

/// Append an audit row; failure is logged and otherwise ignored
pub async fn record(db: &Pool<Sqlite>, action: &str, details: &str) {
    if let Err(e) = log_action(db, action, details).await {
        warn!("Failed to write audit entry '{}': {}", action, e);
    }
}

/// Newest entries first
pub async fn recent_entries(db: &Pool<Sqlite>, limit: i64) -> Result<Vec<AuditEntry>> {
    let rows = sqlx::query(
        "SELECT id, action, details, created_at FROM audit_log ORDER BY id DESC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(db)
    .await?;

    rows.iter()
        .map(|row| {
            let created_at: String = row.get("created_at");
            Ok(AuditEntry {
                id: row.get("id"),
                action: row.get("action"),
                details: row.get("details"),
                created_at: parse_timestamp("created_at", &created_at)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_common::db::init_memory_database;

    #[tokio::test]
    async fn test_entries_newest_first() {
        let db = init_memory_database().await.unwrap();
        log_action(&db, "toggle_email", "enabled=true").await.unwrap();
        record(&db, "set_cooldown", "cooldown=30").await;

        let entries = recent_entries(&db, 10).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, "set_cooldown");
        assert_eq!(entries[1].details, "enabled=true");
    }
}
