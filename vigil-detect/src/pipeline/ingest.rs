//! Frame ingestion loop
//!
//! Owns the capture handle and the sequence assembler. Each step reads one
//! frame, records it in the pipeline context (clip history, overlay counter),
//! feeds the assembler and publishes the rendered frame. Runs on its own OS
//! thread because capture reads block.

use super::assembler::SequenceAssembler;
use super::frame::{ChannelOrder, Frame};
use super::queue::DetectionQueue;
use super::render::render_broadcast_frame;
use super::source::{CaptureHandle, FrameSource, SourceSelection};
use crate::sse::{FrameBroadcaster, LiveFrame};
use crate::state::PipelineContext;
use image::RgbImage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Delay before retrying a failed open or read
pub const RETRY_DELAY: Duration = Duration::from_millis(100);

/// Result of one ingestion step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// A frame was processed
    Frame {
        overlay_active: bool,
        sequence_queued: bool,
    },
    /// Uploaded file reached its end and was restarted
    Rewound,
    /// Open or read failed; try again after [`RETRY_DELAY`]
    Retry,
}

pub struct IngestLoop {
    ctx: Arc<PipelineContext>,
    source: Arc<dyn FrameSource>,
    queue: Arc<DetectionQueue>,
    frames: FrameBroadcaster,
    assembler: SequenceAssembler,
    handle: Option<Box<dyn CaptureHandle>>,
    selection: SourceSelection,
    generation: Option<u64>,
}

impl IngestLoop {
    pub fn new(
        ctx: Arc<PipelineContext>,
        source: Arc<dyn FrameSource>,
        queue: Arc<DetectionQueue>,
        frames: FrameBroadcaster,
        channel_order: ChannelOrder,
    ) -> Self {
        Self {
            ctx,
            source,
            queue,
            frames,
            assembler: SequenceAssembler::new(channel_order),
            handle: None,
            selection: SourceSelection::Webcam,
            generation: None,
        }
    }

    /// Frames waiting in the assembler window
    pub fn pending_frames(&self) -> usize {
        self.assembler.pending()
    }

    /// Apply a pending source switch: release the handle and start both the
    /// window and the clip history over
    fn sync_source(&mut self) {
        let (requested, generation) = self.ctx.requested_source();
        if self.generation == Some(generation) {
            return;
        }

        if self.handle.take().is_some() {
            info!("Releasing {} capture", self.selection.kind());
        }
        self.assembler.reset();
        self.ctx.clear_clip_history();
        self.selection = requested;
        self.generation = Some(generation);
        info!("Frame source set to {:?}", self.selection);
    }

    /// Run one iteration: switch if requested, ensure a handle, read a frame
    pub fn step(&mut self) -> StepOutcome {
        self.sync_source();

        if self.handle.is_none() {
            match self.source.open(&self.selection) {
                Ok(handle) => {
                    debug!("Opened {} capture", self.selection.kind());
                    self.handle = Some(handle);
                }
                Err(e) => {
                    warn!("Cannot open {} source: {}", self.selection.kind(), e);
                    return StepOutcome::Retry;
                }
            }
        }

        let Some(handle) = self.handle.as_mut() else {
            return StepOutcome::Retry;
        };

        match handle.read_frame() {
            Ok(Some(image)) => self.ingest(image),
            Ok(None) => match &self.selection {
                SourceSelection::Upload(_) => match handle.rewind() {
                    Ok(()) => {
                        debug!("Upload finished, looping from start");
                        StepOutcome::Rewound
                    }
                    Err(e) => {
                        warn!("Cannot rewind upload: {}", e);
                        self.handle = None;
                        StepOutcome::Retry
                    }
                },
                SourceSelection::Webcam => {
                    warn!("Webcam stream ended, reopening");
                    self.handle = None;
                    StepOutcome::Retry
                }
            },
            Err(e) => {
                warn!("Frame read failed: {}", e);
                self.handle = None;
                StepOutcome::Retry
            }
        }
    }

    fn ingest(&mut self, image: RgbImage) -> StepOutcome {
        let frame = Frame::new(image, self.selection.kind());
        let record = self.ctx.record_frame(frame.clone());

        let sequence_queued = match self.assembler.push(&frame) {
            Ok(Some(sequence)) => {
                if self.queue.push(sequence) {
                    debug!(
                        "Detection queue full, dropped oldest ({} dropped so far)",
                        self.queue.dropped_count()
                    );
                }
                true
            }
            Ok(None) => false,
            Err(e) => {
                debug!("Dropping frame: {}", e);
                false
            }
        };

        if self.frames.client_count() > 0 {
            match render_broadcast_frame(&frame.image, record.overlay_active) {
                Ok(image) => self.frames.broadcast_lossy(LiveFrame { image }),
                Err(e) => warn!("Frame encode failed: {}", e),
            }
        }

        StepOutcome::Frame {
            overlay_active: record.overlay_active,
            sequence_queued,
        }
    }

    /// Step at the pipeline frame rate until `stop` is set
    pub fn run(mut self, stop: Arc<AtomicBool>) {
        let interval = Duration::from_secs_f64(1.0 / f64::from(self.ctx.frame_rate().max(1)));
        info!("Ingestion loop started ({} fps)", self.ctx.frame_rate());

        while !stop.load(Ordering::Relaxed) {
            let started = Instant::now();
            match self.step() {
                StepOutcome::Retry => std::thread::sleep(RETRY_DELAY),
                _ => {
                    if let Some(remaining) = interval.checked_sub(started.elapsed()) {
                        std::thread::sleep(remaining);
                    }
                }
            }
        }

        self.handle = None;
        info!("Ingestion loop stopped");
    }

    pub fn spawn(self, stop: Arc<AtomicBool>) -> std::io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("vigil-ingest".to_string())
            .spawn(move || self.run(stop))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::pipeline::frame::SEQUENCE_LENGTH;
    use image::Rgb;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use vigil_common::db::models::PipelineSettings;

    /// Yields `frames` solid frames then end of stream
    struct Scripted {
        remaining: usize,
        total: usize,
        rewinds: Arc<Mutex<usize>>,
    }

    impl CaptureHandle for Scripted {
        fn read_frame(&mut self) -> Result<Option<RgbImage>> {
            if self.remaining == 0 {
                return Ok(None);
            }
            self.remaining -= 1;
            Ok(Some(RgbImage::from_pixel(8, 8, Rgb([40, 80, 120]))))
        }

        fn rewind(&mut self) -> Result<()> {
            self.remaining = self.total;
            *self.rewinds.lock().unwrap() += 1;
            Ok(())
        }
    }

    struct ScriptedSource {
        frames: usize,
        fail_webcam: bool,
        rewinds: Arc<Mutex<usize>>,
    }

    impl FrameSource for ScriptedSource {
        fn open(&self, selection: &SourceSelection) -> Result<Box<dyn CaptureHandle>> {
            if self.fail_webcam && *selection == SourceSelection::Webcam {
                return Err(Error::Capture("no camera".into()));
            }
            Ok(Box::new(Scripted {
                remaining: self.frames,
                total: self.frames,
                rewinds: Arc::clone(&self.rewinds),
            }))
        }
    }

    fn ingest_loop(ctx: Arc<PipelineContext>, source: ScriptedSource) -> (IngestLoop, Arc<DetectionQueue>) {
        let queue = Arc::new(DetectionQueue::new(4));
        let ingest = IngestLoop::new(
            ctx,
            Arc::new(source),
            Arc::clone(&queue),
            FrameBroadcaster::new(4),
            ChannelOrder::Bgr,
        );
        (ingest, queue)
    }

    fn source(frames: usize) -> ScriptedSource {
        ScriptedSource {
            frames,
            fail_webcam: false,
            rewinds: Arc::new(Mutex::new(0)),
        }
    }

    #[test]
    fn test_window_of_frames_queues_one_sequence() {
        let ctx = Arc::new(PipelineContext::new(PipelineSettings::default(), 30));
        let (mut ingest, queue) = ingest_loop(ctx, source(100));

        for _ in 0..SEQUENCE_LENGTH - 1 {
            ingest.step();
        }
        assert!(queue.is_empty());

        assert_eq!(
            ingest.step(),
            StepOutcome::Frame {
                overlay_active: false,
                sequence_queued: true
            }
        );
        assert_eq!(queue.len(), 1);
        assert_eq!(ingest.pending_frames(), 0);
    }

    #[test]
    fn test_source_switch_clears_window_and_history() {
        let settings = PipelineSettings {
            clip_capture_enabled: true,
            ..PipelineSettings::default()
        };
        let ctx = Arc::new(PipelineContext::new(settings, 30));
        let (mut ingest, queue) = ingest_loop(Arc::clone(&ctx), source(100));

        for _ in 0..7 {
            ingest.step();
        }
        assert_eq!(ingest.pending_frames(), 7);
        assert_eq!(ctx.clip_history_len(), 7);

        ctx.request_source(SourceSelection::Upload(PathBuf::from("/tmp/u.mp4")));
        ingest.step();

        // Only the first frame from the new source is present
        assert_eq!(ingest.pending_frames(), 1);
        assert_eq!(ctx.clip_history_len(), 1);
        assert_eq!(
            ctx.latest_frame().map(|f| f.source),
            Some(vigil_common::db::models::SourceKind::Upload)
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn test_upload_loops_at_end_of_stream() {
        let ctx = Arc::new(PipelineContext::new(PipelineSettings::default(), 30));
        ctx.request_source(SourceSelection::Upload(PathBuf::from("/tmp/u.mp4")));
        let src = source(3);
        let rewinds = Arc::clone(&src.rewinds);
        let (mut ingest, _queue) = ingest_loop(ctx, src);

        for _ in 0..3 {
            assert!(matches!(ingest.step(), StepOutcome::Frame { .. }));
        }
        assert_eq!(ingest.step(), StepOutcome::Rewound);
        assert!(matches!(ingest.step(), StepOutcome::Frame { .. }));
        assert_eq!(*rewinds.lock().unwrap(), 1);
    }

    #[test]
    fn test_open_failure_retries_without_panicking() {
        let ctx = Arc::new(PipelineContext::new(PipelineSettings::default(), 30));
        let (mut ingest, _queue) = ingest_loop(
            ctx,
            ScriptedSource {
                frames: 5,
                fail_webcam: true,
                rewinds: Arc::new(Mutex::new(0)),
            },
        );

        assert_eq!(ingest.step(), StepOutcome::Retry);
        assert_eq!(ingest.step(), StepOutcome::Retry);
    }

    #[test]
    fn test_overlay_follows_armed_counter() {
        let ctx = Arc::new(PipelineContext::new(PipelineSettings::default(), 30));
        let (mut ingest, _queue) = ingest_loop(Arc::clone(&ctx), source(100));

        ctx.arm_overlay();
        assert!(matches!(
            ingest.step(),
            StepOutcome::Frame {
                overlay_active: true,
                ..
            }
        ));
    }
}
