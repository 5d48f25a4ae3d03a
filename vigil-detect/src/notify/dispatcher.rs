//! Cooldown and notification dispatch
//!
//! Each channel is decided independently: enabled, configured, and outside
//! its own cooldown (now - last successful send >= cooldown). Every attempt
//! leaves exactly one notification record. Only a successful send advances
//! the channel's cooldown timestamp, so a failed channel stays eligible.

use super::{NotificationChannel, OutgoingNotification};
use crate::db;
use crate::media::MediaStore;
use chrono::{DateTime, Duration, Utc};
use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;
use vigil_common::db::models::{Channel, DeliveryOutcome, NotificationRecord, PipelineSettings};

/// Why a channel was not attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    Unconfigured,
    CoolingDown,
    /// Cooldown timestamp could not be read
    StateUnavailable,
}

/// What happened on each channel for one alert
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchReport {
    pub attempts: Vec<(Channel, DeliveryOutcome)>,
    pub skipped: Vec<(Channel, SkipReason)>,
    pub clip_deleted: bool,
}

impl DispatchReport {
    pub fn outcome(&self, channel: Channel) -> Option<DeliveryOutcome> {
        self.attempts
            .iter()
            .find(|(c, _)| *c == channel)
            .map(|(_, outcome)| *outcome)
    }

    pub fn skip_reason(&self, channel: Channel) -> Option<SkipReason> {
        self.skipped
            .iter()
            .find(|(c, _)| *c == channel)
            .map(|(_, reason)| *reason)
    }
}

/// A persisted alert ready for delivery
#[derive(Debug, Clone)]
pub struct AlertDispatch {
    pub alert_id: Uuid,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
    /// Media store name of the extracted clip, if any
    pub clip: Option<String>,
}

pub struct NotificationDispatcher {
    db: Pool<Sqlite>,
    media: Arc<MediaStore>,
    email: Option<Arc<dyn NotificationChannel>>,
    sms: Option<Arc<dyn NotificationChannel>>,
}

impl NotificationDispatcher {
    pub fn new(
        db: Pool<Sqlite>,
        media: Arc<MediaStore>,
        email: Option<Arc<dyn NotificationChannel>>,
        sms: Option<Arc<dyn NotificationChannel>>,
    ) -> Self {
        Self {
            db,
            media,
            email,
            sms,
        }
    }

    fn transport(&self, channel: Channel) -> Option<&Arc<dyn NotificationChannel>> {
        match channel {
            Channel::Email => self.email.as_ref(),
            Channel::Sms => self.sms.as_ref(),
        }
    }

    /// Deliver one alert on every eligible channel
    ///
    /// Delivery failures are recorded, never returned; the alert row is
    /// untouched whatever happens here.
    pub async fn dispatch(
        &self,
        settings: &PipelineSettings,
        alert: &AlertDispatch,
        now: DateTime<Utc>,
    ) -> DispatchReport {
        let mut report = DispatchReport::default();

        if !settings.any_channel_enabled() {
            if let Some(clip) = &alert.clip {
                report.clip_deleted = self.discard_clip(clip).await;
            }
            report.skipped = Channel::ALL
                .iter()
                .map(|c| (*c, SkipReason::Disabled))
                .collect();
            return report;
        }

        let cooldown = Duration::seconds(i64::from(settings.cooldown_seconds));

        for channel in Channel::ALL {
            if !settings.channel_enabled(channel) {
                report.skipped.push((channel, SkipReason::Disabled));
                continue;
            }

            let Some(transport) = self.transport(channel) else {
                warn!("{} notifications enabled but no transport is configured", channel);
                report.skipped.push((channel, SkipReason::Unconfigured));
                continue;
            };

            match db::settings::get_last_sent(&self.db, channel).await {
                Ok(Some(last)) if now.signed_duration_since(last) < cooldown => {
                    info!("{} notification suppressed by cooldown", channel);
                    report.skipped.push((channel, SkipReason::CoolingDown));
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    error!("Cannot read {} cooldown state: {}", channel, e);
                    report.skipped.push((channel, SkipReason::StateUnavailable));
                    continue;
                }
            }

            let attachment = match (channel, &alert.clip) {
                (Channel::Email, Some(clip)) => match self.media.path_for(clip) {
                    Ok(path) if path.is_file() => Some(path),
                    _ => None,
                },
                _ => None,
            };

            let notification = OutgoingNotification {
                alert_id: alert.alert_id,
                message: alert.message.clone(),
                occurred_at: alert.occurred_at,
                attachment,
            };

            let outcome = self
                .attempt(transport.as_ref(), &notification, now)
                .await;
            report.attempts.push((channel, outcome));

            if channel == Channel::Email {
                if let Some(clip) = &alert.clip {
                    report.clip_deleted = self.discard_clip(clip).await;
                }
            }
        }

        report
    }

    /// One send plus its audit record and, on success, the cooldown update
    async fn attempt(
        &self,
        transport: &dyn NotificationChannel,
        notification: &OutgoingNotification,
        now: DateTime<Utc>,
    ) -> DeliveryOutcome {
        let channel = transport.channel();

        let (outcome, message) = match transport.send(notification).await {
            Ok(()) => {
                info!("{} notification sent for alert {}", channel, notification.alert_id);
                (DeliveryOutcome::Sent, String::new())
            }
            Err(e) => {
                warn!(
                    "{} notification failed for alert {}: {}",
                    channel, notification.alert_id, e
                );
                (DeliveryOutcome::Failed, e.to_string())
            }
        };

        let record = NotificationRecord {
            alert_id: notification.alert_id,
            channel,
            recipient: transport.recipient(),
            timestamp: now,
            outcome,
            message,
        };
        if let Err(e) = db::notifications::record_notification(&self.db, &record).await {
            error!("Failed to record {} notification attempt: {}", channel, e);
        }

        if outcome == DeliveryOutcome::Sent {
            if let Err(e) = db::settings::set_last_sent(&self.db, channel, now).await {
                error!("Failed to update {} cooldown: {}", channel, e);
            }
        }

        outcome
    }

    /// Remove a clip file and its row; returns true when both are gone
    async fn discard_clip(&self, clip: &str) -> bool {
        let file = self.media.delete(clip).await;
        let row = db::clips::remove_clip(&self.db, clip).await;
        match (file, row) {
            (Ok(()), Ok(_)) => true,
            (file, row) => {
                if let Err(e) = file {
                    warn!("Failed to delete clip file {}: {}", clip, e);
                }
                if let Err(e) = row {
                    warn!("Failed to remove clip row {}: {}", clip, e);
                }
                false
            }
        }
    }
}
