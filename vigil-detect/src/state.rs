//! Shared pipeline state
//!
//! One context object passed to the ingestion loop, the detection worker
//! and the control handlers. Everything inside is guarded by a single mutex
//! whose critical sections cover a read/modify/copy only, never capture,
//! inference or I/O.

use crate::pipeline::frame::Frame;
use crate::pipeline::ring_buffer::FrameRing;
use crate::pipeline::source::SourceSelection;
use std::sync::{Mutex, MutexGuard};
use vigil_common::db::models::PipelineSettings;

/// Frames rendered with the alert overlay after an allowed positive detection
pub const OVERLAY_FRAMES: u32 = 20;

/// Result of recording one captured frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRecord {
    /// Draw the alert overlay on this frame
    pub overlay_active: bool,
    /// Frame was appended to the clip history
    pub buffered: bool,
}

struct PipelineInner {
    settings: PipelineSettings,
    ring: FrameRing,
    overlay_remaining: u32,
    latest_frame: Option<Frame>,
    requested_source: SourceSelection,
    source_generation: u64,
}

/// Shared state accessible by all pipeline components
pub struct PipelineContext {
    inner: Mutex<PipelineInner>,
    frame_rate: u32,
}

impl PipelineContext {
    pub fn new(settings: PipelineSettings, frame_rate: u32) -> Self {
        let capacity = settings.clip_capacity(frame_rate);
        Self {
            inner: Mutex::new(PipelineInner {
                settings,
                ring: FrameRing::new(capacity),
                overlay_remaining: 0,
                latest_frame: None,
                requested_source: SourceSelection::Webcam,
                source_generation: 0,
            }),
            frame_rate,
        }
    }

    fn lock(&self) -> MutexGuard<'_, PipelineInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn frame_rate(&self) -> u32 {
        self.frame_rate
    }

    /// Current settings (copied; callers re-read at each decision point)
    pub fn settings(&self) -> PipelineSettings {
        self.lock().settings.clone()
    }

    /// Apply a settings mutation and reconcile the clip history with it
    ///
    /// Disabling clip capture clears the history immediately; a new clip
    /// duration resizes it, keeping the most recent frames.
    pub fn update_settings<F>(&self, mutate: F) -> PipelineSettings
    where
        F: FnOnce(&mut PipelineSettings),
    {
        let mut inner = self.lock();
        mutate(&mut inner.settings);

        let capacity = inner.settings.clip_capacity(self.frame_rate);
        inner.ring.resize(capacity);
        if !inner.settings.clip_capture_enabled {
            inner.ring.clear();
        }

        inner.settings.clone()
    }

    /// Record a captured frame: keep it as the snapshot source, append it to
    /// the clip history when capture is on, and step the overlay counter
    pub fn record_frame(&self, frame: Frame) -> FrameRecord {
        let mut inner = self.lock();

        let buffered = inner.settings.clip_capture_enabled;
        if buffered {
            inner.ring.push(frame.clone());
        }
        inner.latest_frame = Some(frame);

        let overlay_active = inner.overlay_remaining > 0;
        if overlay_active {
            inner.overlay_remaining -= 1;
        }

        FrameRecord {
            overlay_active,
            buffered,
        }
    }

    /// Show the alert overlay on the next [`OVERLAY_FRAMES`] frames
    pub fn arm_overlay(&self) {
        self.lock().overlay_remaining = OVERLAY_FRAMES;
    }

    pub fn overlay_remaining(&self) -> u32 {
        self.lock().overlay_remaining
    }

    /// Full clip history, or `None` when capture is off or history is short
    pub fn extract_clip(&self) -> Option<Vec<Frame>> {
        let inner = self.lock();
        if !inner.settings.clip_capture_enabled {
            return None;
        }
        inner.ring.full_snapshot()
    }

    pub fn clip_history_len(&self) -> usize {
        self.lock().ring.len()
    }

    pub fn clip_history_capacity(&self) -> usize {
        self.lock().ring.capacity()
    }

    /// Drop the clip history (source switch)
    pub fn clear_clip_history(&self) {
        self.lock().ring.clear();
    }

    pub fn latest_frame(&self) -> Option<Frame> {
        self.lock().latest_frame.clone()
    }

    /// Ask the ingestion loop to switch to `selection` on its next step
    pub fn request_source(&self, selection: SourceSelection) -> u64 {
        let mut inner = self.lock();
        inner.requested_source = selection;
        inner.source_generation += 1;
        inner.source_generation
    }

    /// Requested source and its generation counter
    pub fn requested_source(&self) -> (SourceSelection, u64) {
        let inner = self.lock();
        (inner.requested_source.clone(), inner.source_generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use std::path::PathBuf;
    use vigil_common::db::models::SourceKind;

    fn frame() -> Frame {
        Frame::new(RgbImage::new(2, 2), SourceKind::Webcam)
    }

    fn capture_settings(seconds: f64) -> PipelineSettings {
        PipelineSettings {
            clip_capture_enabled: true,
            clip_duration_seconds: seconds,
            ..PipelineSettings::default()
        }
    }

    #[test]
    fn test_overlay_counts_down() {
        let ctx = PipelineContext::new(PipelineSettings::default(), 30);
        assert!(!ctx.record_frame(frame()).overlay_active);

        ctx.arm_overlay();
        for _ in 0..OVERLAY_FRAMES {
            assert!(ctx.record_frame(frame()).overlay_active);
        }
        assert!(!ctx.record_frame(frame()).overlay_active);
    }

    #[test]
    fn test_frames_buffered_only_with_capture_enabled() {
        let ctx = PipelineContext::new(PipelineSettings::default(), 10);
        assert!(!ctx.record_frame(frame()).buffered);
        assert_eq!(ctx.clip_history_len(), 0);
        assert!(ctx.latest_frame().is_some());

        ctx.update_settings(|s| s.clip_capture_enabled = true);
        assert!(ctx.record_frame(frame()).buffered);
        assert_eq!(ctx.clip_history_len(), 1);
    }

    #[test]
    fn test_clip_unavailable_until_history_full() {
        // 0.5 s at 10 fps = 5 frames
        let ctx = PipelineContext::new(capture_settings(0.5), 10);
        for _ in 0..4 {
            ctx.record_frame(frame());
        }
        assert!(ctx.extract_clip().is_none());

        ctx.record_frame(frame());
        assert_eq!(ctx.extract_clip().map(|c| c.len()), Some(5));
    }

    #[test]
    fn test_disabling_capture_clears_history() {
        let ctx = PipelineContext::new(capture_settings(1.0), 10);
        for _ in 0..10 {
            ctx.record_frame(frame());
        }
        assert_eq!(ctx.clip_history_len(), 10);

        ctx.update_settings(|s| s.clip_capture_enabled = false);
        assert_eq!(ctx.clip_history_len(), 0);
        assert!(ctx.extract_clip().is_none());

        ctx.record_frame(frame());
        assert_eq!(ctx.clip_history_len(), 0);
    }

    #[test]
    fn test_clip_duration_resizes_history() {
        let ctx = PipelineContext::new(capture_settings(1.0), 10);
        assert_eq!(ctx.clip_history_capacity(), 10);

        let settings = ctx.update_settings(|s| s.clip_duration_seconds = 3.0);
        assert_eq!(settings.clip_duration_seconds, 3.0);
        assert_eq!(ctx.clip_history_capacity(), 30);
    }

    #[test]
    fn test_source_requests_bump_generation() {
        let ctx = PipelineContext::new(PipelineSettings::default(), 30);
        assert_eq!(ctx.requested_source(), (SourceSelection::Webcam, 0));

        let path = PathBuf::from("/tmp/u.mp4");
        assert_eq!(ctx.request_source(SourceSelection::Upload(path.clone())), 1);
        assert_eq!(ctx.requested_source(), (SourceSelection::Upload(path), 1));
    }
}
