//! Alert notifications
//!
//! Transports implement [`NotificationChannel`]; the
//! [`NotificationDispatcher`] decides per channel whether an attempt is
//! allowed and keeps the audit trail and cooldown timestamps.

pub mod dispatcher;
pub mod email;
pub mod sms;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use std::path::PathBuf;
use uuid::Uuid;
use vigil_common::db::models::Channel;

pub use dispatcher::{DispatchReport, NotificationDispatcher, SkipReason};
pub use email::MailRelayChannel;
pub use sms::TwilioSmsChannel;

/// Email subject line
pub const EMAIL_SUBJECT: &str = "Shoplifting Alert";

/// One alert to deliver
#[derive(Debug, Clone)]
pub struct OutgoingNotification {
    pub alert_id: Uuid,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
    /// Clip to attach (email only)
    pub attachment: Option<PathBuf>,
}

impl OutgoingNotification {
    /// Local wall-clock time shown to recipients
    pub fn display_time(&self) -> String {
        self.occurred_at
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
    }

    pub fn email_body(&self) -> String {
        format!("Shoplifting detected at {}: {}", self.display_time(), self.message)
    }

    pub fn sms_body(&self) -> String {
        format!("Shoplifting Alert at {}: {}", self.display_time(), self.message)
    }
}

/// A delivery transport for one channel
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn channel(&self) -> Channel;

    /// Recipient as recorded in the audit trail
    fn recipient(&self) -> String;

    async fn send(&self, notification: &OutgoingNotification) -> Result<()>;
}
