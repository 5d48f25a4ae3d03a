//! Notification attempt audit trail (append-only)

use super::{format_timestamp, parse_guid, parse_timestamp};
use crate::error::{Error, Result};
use sqlx::{Pool, Row, Sqlite};
use uuid::Uuid;
use vigil_common::db::models::NotificationRecord;

pub async fn record_notification(db: &Pool<Sqlite>, record: &NotificationRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO notifications (guid, alert_guid, channel, recipient, sent_at, outcome, message)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(record.alert_id.to_string())
    .bind(record.channel.as_str())
    .bind(&record.recipient)
    .bind(format_timestamp(record.timestamp))
    .bind(record.outcome.as_str())
    .bind(&record.message)
    .execute(db)
    .await?;

    Ok(())
}

/// Attempts for one alert, oldest first
pub async fn list_for_alert(db: &Pool<Sqlite>, alert_id: Uuid) -> Result<Vec<NotificationRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT alert_guid, channel, recipient, sent_at, outcome, message
        FROM notifications
        WHERE alert_guid = ?
        ORDER BY sent_at, rowid
        "#,
    )
    .bind(alert_id.to_string())
    .fetch_all(db)
    .await?;

    rows.iter()
        .map(|row| {
            let alert_guid: String = row.get("alert_guid");
            let channel: String = row.get("channel");
            let sent_at: String = row.get("sent_at");
            let outcome: String = row.get("outcome");
            Ok(NotificationRecord {
                alert_id: parse_guid(&alert_guid)?,
                channel: channel.parse().map_err(Error::Internal)?,
                recipient: row.get("recipient"),
                timestamp: parse_timestamp("sent_at", &sent_at)?,
                outcome: outcome.parse().map_err(Error::Internal)?,
                message: row.get("message"),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use vigil_common::db::init_memory_database;
    use vigil_common::db::models::{Channel, DeliveryOutcome};

    #[tokio::test]
    async fn test_records_survive_without_alert_row() {
        let db = init_memory_database().await.unwrap();
        let alert_id = Uuid::new_v4();
        let at = Utc.with_ymd_and_hms(2024, 2, 2, 8, 0, 0).unwrap();

        let failed = NotificationRecord {
            alert_id,
            channel: Channel::Sms,
            recipient: "+15550100".to_string(),
            timestamp: at,
            outcome: DeliveryOutcome::Failed,
            message: "timeout".to_string(),
        };
        let sent = NotificationRecord {
            channel: Channel::Email,
            recipient: "ops@example.com".to_string(),
            outcome: DeliveryOutcome::Sent,
            message: String::new(),
            ..failed.clone()
        };
        record_notification(&db, &failed).await.unwrap();
        record_notification(&db, &sent).await.unwrap();

        let listed = list_for_alert(&db, alert_id).await.unwrap();
        assert_eq!(listed, vec![failed, sent]);
        assert!(list_for_alert(&db, Uuid::new_v4()).await.unwrap().is_empty());
    }
}
