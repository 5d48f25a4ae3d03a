//! Event types for the Vigil event system
//!
//! A closed set of broadcast variants plus the EventBus that fans them out
//! to SSE subscribers.

use crate::db::models::{AlertRecord, PipelineSettings, SourceKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Message attached to every fired alert
pub const ALERT_MESSAGE: &str = "Suspicious activity detected!";

/// Vigil broadcast events
///
/// Serialized with a `type` tag for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum VigilEvent {
    /// A positive detection passed the alert cooldown gate
    ///
    /// Fired whether or not alert logging is enabled.
    AlertFired {
        message: String,
        confidence: f64,
        source: SourceKind,
        timestamp: DateTime<Utc>,
    },

    /// Runtime settings after a successful mutation (or on connect)
    SettingsChanged {
        settings: PipelineSettings,
        timestamp: DateTime<Utc>,
    },

    /// A snapshot of the current frame was written to the media store
    SnapshotSaved {
        url: String,
        timestamp: DateTime<Utc>,
    },

    /// Recent alerts, pushed to a client right after it connects
    AlertLogs { alerts: Vec<AlertRecord> },

    /// Operator changed an alert's status, notes or flags
    AlertUpdated { alert: AlertRecord },

    /// Operator dismissed an alert (row deleted)
    AlertDismissed {
        alert_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// All alerts were cleared
    AlertsCleared { timestamp: DateTime<Utc> },

    /// Active frame source changed
    SourceChanged {
        source: SourceKind,
        upload_id: Option<String>,
        timestamp: DateTime<Utc>,
    },
}

impl VigilEvent {
    /// Event type name, used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            VigilEvent::AlertFired { .. } => "AlertFired",
            VigilEvent::SettingsChanged { .. } => "SettingsChanged",
            VigilEvent::SnapshotSaved { .. } => "SnapshotSaved",
            VigilEvent::AlertLogs { .. } => "AlertLogs",
            VigilEvent::AlertUpdated { .. } => "AlertUpdated",
            VigilEvent::AlertDismissed { .. } => "AlertDismissed",
            VigilEvent::AlertsCleared { .. } => "AlertsCleared",
            VigilEvent::SourceChanged { .. } => "SourceChanged",
        }
    }

    pub fn settings_changed(settings: PipelineSettings) -> Self {
        VigilEvent::SettingsChanged {
            settings,
            timestamp: Utc::now(),
        }
    }
}

/// Central event distribution bus
///
/// Thin wrapper over `tokio::sync::broadcast`: producers never block, slow
/// subscribers see `Lagged` and skip ahead.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<VigilEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<VigilEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if nobody is listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: VigilEvent,
    ) -> Result<usize, broadcast::error::SendError<VigilEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the no-subscriber case
    pub fn emit_lossy(&self, event: VigilEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_reaches_subscriber() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let sent = bus
            .emit(VigilEvent::AlertFired {
                message: ALERT_MESSAGE.to_string(),
                confidence: 0.2,
                source: SourceKind::Webcam,
                timestamp: Utc::now(),
            })
            .unwrap();
        assert_eq!(sent, 1);

        match rx.recv().await.unwrap() {
            VigilEvent::AlertFired {
                message,
                confidence,
                ..
            } => {
                assert_eq!(message, ALERT_MESSAGE);
                assert_eq!(confidence, 0.2);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(4);
        assert_eq!(bus.subscriber_count(), 0);
        assert!(bus
            .emit(VigilEvent::AlertsCleared {
                timestamp: Utc::now()
            })
            .is_err());
        bus.emit_lossy(VigilEvent::AlertsCleared {
            timestamp: Utc::now(),
        });
        assert_eq!(bus.capacity(), 4);
    }

    #[test]
    fn test_serialized_tag_matches_event_type() {
        let event = VigilEvent::settings_changed(PipelineSettings::default());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.event_type());
        assert_eq!(json["settings"]["cooldown_seconds"], 60);
    }
}
