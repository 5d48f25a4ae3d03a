//! Sequence assembler
//!
//! Preprocesses each frame into the working window and hands off a complete
//! [`Sequence`] exactly when the window reaches its configured length.

use super::frame::{preprocess, ChannelOrder, Frame, PreprocessedFrame, Sequence, SEQUENCE_LENGTH};
use crate::error::Result;

pub struct SequenceAssembler {
    window: Vec<PreprocessedFrame>,
    channel_order: ChannelOrder,
}

impl SequenceAssembler {
    pub fn new(channel_order: ChannelOrder) -> Self {
        Self {
            window: Vec::with_capacity(SEQUENCE_LENGTH),
            channel_order,
        }
    }

    /// Add one frame to the window
    ///
    /// Returns the completed sequence when this frame fills the window, after
    /// which the window starts over empty. A frame that fails preprocessing is
    /// rejected with an error and does not advance the window.
    pub fn push(&mut self, frame: &Frame) -> Result<Option<Sequence>> {
        let processed = preprocess(&frame.image, self.channel_order)?;
        self.window.push(processed);

        if self.window.len() < SEQUENCE_LENGTH {
            return Ok(None);
        }

        let frames = std::mem::replace(&mut self.window, Vec::with_capacity(SEQUENCE_LENGTH));
        Sequence::from_frames(&frames, frame.source).map(Some)
    }

    /// Discard the in-progress window
    pub fn reset(&mut self) {
        self.window.clear();
    }

    /// Frames currently waiting in the window
    pub fn pending(&self) -> usize {
        self.window.len()
    }
}

impl Default for SequenceAssembler {
    fn default() -> Self {
        Self::new(ChannelOrder::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use vigil_common::db::models::SourceKind;

    fn frame() -> Frame {
        Frame::new(RgbImage::from_pixel(16, 12, Rgb([10, 20, 30])), SourceKind::Upload)
    }

    #[test]
    fn test_window_minus_one_emits_nothing() {
        let mut assembler = SequenceAssembler::default();
        for _ in 0..SEQUENCE_LENGTH - 1 {
            assert!(assembler.push(&frame()).unwrap().is_none());
        }
        assert_eq!(assembler.pending(), SEQUENCE_LENGTH - 1);
    }

    #[test]
    fn test_full_window_emits_once_and_resets() {
        let mut assembler = SequenceAssembler::default();
        let mut emitted = Vec::new();
        for _ in 0..SEQUENCE_LENGTH {
            if let Some(seq) = assembler.push(&frame()).unwrap() {
                emitted.push(seq);
            }
        }

        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].len(), SEQUENCE_LENGTH);
        assert_eq!(emitted[0].source, SourceKind::Upload);
        assert_eq!(assembler.pending(), 0);
    }

    #[test]
    fn test_bad_frame_does_not_advance_window() {
        let mut assembler = SequenceAssembler::default();
        assembler.push(&frame()).unwrap();

        let empty = Frame::new(RgbImage::new(0, 0), SourceKind::Webcam);
        assert!(assembler.push(&empty).is_err());
        assert_eq!(assembler.pending(), 1);
    }

    #[test]
    fn test_reset_discards_partial_window() {
        let mut assembler = SequenceAssembler::default();
        for _ in 0..5 {
            assembler.push(&frame()).unwrap();
        }
        assembler.reset();
        assert_eq!(assembler.pending(), 0);
    }
}
