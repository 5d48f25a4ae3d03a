//! Detection worker
//!
//! Pulls one sequence at a time from the detection queue, classifies it and
//! runs the alert path for positives. Any error is confined to the sequence
//! that caused it.

use super::queue::DetectionQueue;
use crate::classifier::{Classifier, DetectionResult};
use crate::db;
use crate::error::{Error, Result};
use crate::media::clip::ClipEncoder;
use crate::media::MediaStore;
use crate::notify::dispatcher::AlertDispatch;
use crate::notify::{DispatchReport, NotificationDispatcher};
use crate::pipeline::frame::Sequence;
use crate::state::PipelineContext;
use chrono::{DateTime, Duration, Utc};
use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use vigil_common::events::{EventBus, VigilEvent, ALERT_MESSAGE};

/// Global alert-creation cooldown
///
/// Independent of the per-channel notification cooldowns: it limits how
/// often any alert fires, even with notifications off.
#[derive(Debug, Default)]
pub struct AlertGate {
    last_alert: Option<DateTime<Utc>>,
}

impl AlertGate {
    /// Admit an alert at `now` if the cooldown has elapsed, and start a new one
    pub fn try_fire(&mut self, now: DateTime<Utc>, cooldown_seconds: u32) -> bool {
        if let Some(last) = self.last_alert {
            if now.signed_duration_since(last) < Duration::seconds(i64::from(cooldown_seconds)) {
                return false;
            }
        }
        self.last_alert = Some(now);
        true
    }

    pub fn last_alert(&self) -> Option<DateTime<Utc>> {
        self.last_alert
    }
}

/// What the worker did with one sequence
#[derive(Debug, Clone, PartialEq)]
pub enum SequenceOutcome {
    Negative { confidence: f32 },
    /// Positive, inside the alert cooldown
    Suppressed { confidence: f32 },
    /// Alert broadcast only (logging disabled)
    Broadcast { confidence: f32 },
    /// Alert broadcast, persisted and dispatched
    Logged {
        alert_id: Uuid,
        clip: Option<String>,
        report: DispatchReport,
    },
}

pub struct DetectionWorker {
    ctx: Arc<PipelineContext>,
    db: Pool<Sqlite>,
    events: EventBus,
    classifier: Arc<dyn Classifier>,
    media: Arc<MediaStore>,
    encoder: Arc<dyn ClipEncoder>,
    dispatcher: Arc<NotificationDispatcher>,
    gate: AlertGate,
}

impl DetectionWorker {
    pub fn new(
        ctx: Arc<PipelineContext>,
        db: Pool<Sqlite>,
        events: EventBus,
        classifier: Arc<dyn Classifier>,
        media: Arc<MediaStore>,
        encoder: Arc<dyn ClipEncoder>,
        dispatcher: Arc<NotificationDispatcher>,
    ) -> Self {
        Self {
            ctx,
            db,
            events,
            classifier,
            media,
            encoder,
            dispatcher,
            gate: AlertGate::default(),
        }
    }

    /// Classify one sequence and run the alert path
    pub async fn process_sequence(
        &mut self,
        sequence: &Sequence,
        now: DateTime<Utc>,
    ) -> Result<SequenceOutcome> {
        let score = self.classifier.classify(sequence).await?;
        let result = DetectionResult::from_score(score)?;
        let confidence = result.confidence;

        if !result.is_positive {
            debug!("Negative window (score {:.3})", confidence);
            return Ok(SequenceOutcome::Negative { confidence });
        }

        let settings = self.ctx.settings();
        if !self.gate.try_fire(now, settings.cooldown_seconds) {
            debug!("Positive window inside alert cooldown (score {:.3})", confidence);
            return Ok(SequenceOutcome::Suppressed { confidence });
        }

        info!(
            "Alert: positive detection on {} (score {:.3})",
            sequence.source, confidence
        );
        self.ctx.arm_overlay();
        self.events.emit_lossy(VigilEvent::AlertFired {
            message: ALERT_MESSAGE.to_string(),
            confidence: f64::from(confidence),
            source: sequence.source,
            timestamp: now,
        });

        if !settings.logging_enabled {
            return Ok(SequenceOutcome::Broadcast { confidence });
        }

        let alert = db::alerts::create_alert(
            &self.db,
            f64::from(confidence),
            sequence.source,
            ALERT_MESSAGE,
            now,
        )
        .await?;
        db::audit::record(
            &self.db,
            "alert_detected",
            &format!(
                "alert_id={} confidence={:.3} source={}",
                alert.alert_id, confidence, sequence.source
            ),
        )
        .await;

        let clip = self.save_clip(alert.alert_id, now).await;

        // Settings may have changed while the clip was encoding
        let settings = self.ctx.settings();
        let report = self
            .dispatcher
            .dispatch(
                &settings,
                &AlertDispatch {
                    alert_id: alert.alert_id,
                    message: alert.message.clone(),
                    occurred_at: now,
                    clip: clip.clone(),
                },
                now,
            )
            .await;

        Ok(SequenceOutcome::Logged {
            alert_id: alert.alert_id,
            clip,
            report,
        })
    }

    /// Encode the clip history for an alert; `None` if unavailable or failed
    async fn save_clip(&self, alert_id: Uuid, now: DateTime<Utc>) -> Option<String> {
        let frames = match self.ctx.extract_clip() {
            Some(frames) => frames,
            None => {
                debug!("No clip for alert {}: capture off or history too short", alert_id);
                return None;
            }
        };

        let name = self.media.clip_name(now);
        let path = match self.media.path_for(&name) {
            Ok(path) => path,
            Err(e) => {
                error!("Cannot place clip {}: {}", name, e);
                return None;
            }
        };

        let frame_rate = self.ctx.frame_rate();
        let frame_count = frames.len();
        let encoder = Arc::clone(&self.encoder);
        let target = path.clone();
        let encoded = tokio::task::spawn_blocking(move || encoder.encode(&frames, &target, frame_rate))
            .await
            .map_err(|e| Error::Internal(format!("clip encoder task failed: {}", e)))
            .and_then(|r| r);

        if let Err(e) = encoded {
            error!("Clip encoding failed for alert {}: {}", alert_id, e);
            let _ = self.media.delete(&name).await;
            return None;
        }

        let size_bytes = match tokio::fs::metadata(&path).await {
            Ok(meta) => meta.len(),
            Err(e) => {
                error!("Clip {} missing after encoding: {}", name, e);
                return None;
            }
        };

        let duration = frame_count as f64 / f64::from(frame_rate.max(1));
        if let Err(e) =
            db::clips::insert_clip(&self.db, alert_id, &name, duration, size_bytes, now).await
        {
            error!("Failed to record clip {}: {}", name, e);
            let _ = self.media.delete(&name).await;
            return None;
        }

        info!("Saved clip {} ({} frames) for alert {}", name, frame_count, alert_id);
        Some(name)
    }

    /// Consume sequences until the queue is closed
    pub async fn run(mut self, queue: Arc<DetectionQueue>) {
        info!("Detection worker started");
        while let Some(sequence) = queue.pop().await {
            if let Err(e) = self.process_sequence(&sequence, Utc::now()).await {
                warn!("Discarding sequence: {}", e);
            }
        }
        info!("Detection worker stopped");
    }

    pub fn spawn(self, queue: Arc<DetectionQueue>) -> JoinHandle<()> {
        tokio::spawn(self.run(queue))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_gate_sixty_second_cooldown() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let mut gate = AlertGate::default();
        assert!(gate.try_fire(start, 60));
        assert!(!gate.try_fire(start + Duration::seconds(10), 60));
        assert_eq!(gate.last_alert(), Some(start));

        let mut gate = AlertGate::default();
        assert!(gate.try_fire(start, 60));
        assert!(gate.try_fire(start + Duration::seconds(61), 60));
    }

    #[test]
    fn test_zero_cooldown_always_fires() {
        let start = Utc::now();
        let mut gate = AlertGate::default();
        assert!(gate.try_fire(start, 0));
        assert!(gate.try_fire(start, 0));
    }
}
