//! Database models shared across Vigil crates

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Where frames are coming from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Webcam,
    Upload,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Webcam => "webcam",
            SourceKind::Upload => "upload",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "webcam" => Ok(SourceKind::Webcam),
            "upload" => Ok(SourceKind::Upload),
            other => Err(format!("unknown source: {}", other)),
        }
    }
}

/// Operator workflow status of an alert
///
/// `Dismissed` is never stored: dismissing an alert deletes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    New,
    Processed,
    Dismissed,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::New => "new",
            AlertStatus::Processed => "processed",
            AlertStatus::Dismissed => "dismissed",
        }
    }
}

impl FromStr for AlertStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(AlertStatus::New),
            "processed" => Ok(AlertStatus::Processed),
            "dismissed" => Ok(AlertStatus::Dismissed),
            other => Err(format!("unknown alert status: {}", other)),
        }
    }
}

/// Notification delivery channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Sms,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Email, Channel::Sms];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Sms => "sms",
        }
    }

    /// Settings key holding the last successful send time for this channel
    pub fn cooldown_key(&self) -> &'static str {
        match self {
            Channel::Email => "last_email_sent_at",
            Channel::Sms => "last_sms_sent_at",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Channel::Email),
            "sms" => Ok(Channel::Sms),
            other => Err(format!("unknown channel: {}", other)),
        }
    }
}

/// Result of one notification attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryOutcome {
    Sent,
    Failed,
}

impl DeliveryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryOutcome::Sent => "sent",
            DeliveryOutcome::Failed => "failed",
        }
    }
}

impl FromStr for DeliveryOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(DeliveryOutcome::Sent),
            "failed" => Ok(DeliveryOutcome::Failed),
            other => Err(format!("unknown outcome: {}", other)),
        }
    }
}

/// Process-wide runtime settings, persisted in the `settings` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSettings {
    pub clip_capture_enabled: bool,
    pub clip_duration_seconds: f64,
    pub cooldown_seconds: u32,
    pub email_enabled: bool,
    pub sms_enabled: bool,
    pub logging_enabled: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            clip_capture_enabled: false,
            clip_duration_seconds: 6.0,
            cooldown_seconds: 60,
            email_enabled: false,
            sms_enabled: false,
            logging_enabled: true,
        }
    }
}

impl PipelineSettings {
    pub fn channel_enabled(&self, channel: Channel) -> bool {
        match channel {
            Channel::Email => self.email_enabled,
            Channel::Sms => self.sms_enabled,
        }
    }

    pub fn any_channel_enabled(&self) -> bool {
        self.email_enabled || self.sms_enabled
    }

    /// Ring buffer capacity in frames for the configured clip duration
    pub fn clip_capacity(&self, frame_rate: u32) -> usize {
        ((self.clip_duration_seconds * frame_rate as f64) as usize).max(1)
    }
}

/// Persisted alert as exposed to operators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub alert_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub confidence: f64,
    pub source: SourceKind,
    pub status: AlertStatus,
    pub message: String,
    pub read: bool,
    pub false_positive: bool,
    pub notes: String,
    pub clip_url: Option<String>,
}

/// Append-only notification audit row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub alert_id: Uuid,
    pub channel: Channel,
    pub recipient: String,
    pub timestamp: DateTime<Utc>,
    pub outcome: DeliveryOutcome,
    pub message: String,
}
