//! Frame, preprocessed frame and sequence types
//!
//! Raw frames are shared (`Arc`) between the ring buffer, the assembler and
//! the render path and are never mutated after capture. The assembler turns
//! each one into a fixed-size normalized tensor; N of those make a Sequence.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::{Array3, Array4, Axis};
use std::str::FromStr;
use std::sync::Arc;
use vigil_common::db::models::SourceKind;

/// Classifier input frame height
pub const FRAME_HEIGHT: usize = 64;

/// Classifier input frame width
pub const FRAME_WIDTH: usize = 64;

/// Color channels per pixel
pub const CHANNELS: usize = 3;

/// Frames per classifier window
pub const SEQUENCE_LENGTH: usize = 20;

/// A captured frame
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: Arc<RgbImage>,
    pub captured_at: DateTime<Utc>,
    pub source: SourceKind,
}

impl Frame {
    pub fn new(image: RgbImage, source: SourceKind) -> Self {
        Self {
            image: Arc::new(image),
            captured_at: Utc::now(),
            source,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Channel order the classifier was trained with
///
/// Models trained on OpenCV-decoded video expect BGR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelOrder {
    #[default]
    Bgr,
    Rgb,
}

impl FromStr for ChannelOrder {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bgr" => Ok(ChannelOrder::Bgr),
            "rgb" => Ok(ChannelOrder::Rgb),
            other => Err(format!("unknown channel order '{}' (expected bgr or rgb)", other)),
        }
    }
}

/// 64x64x3 float tensor, values in [0, 1]
#[derive(Debug, Clone)]
pub struct PreprocessedFrame {
    data: Array3<f32>,
}

impl PreprocessedFrame {
    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }
}

/// Resize to the classifier input size and normalize to [0, 1]
pub fn preprocess(image: &RgbImage, order: ChannelOrder) -> Result<PreprocessedFrame> {
    if image.width() == 0 || image.height() == 0 {
        return Err(Error::Preprocess(format!(
            "empty frame ({}x{})",
            image.width(),
            image.height()
        )));
    }

    let resized = imageops::resize(
        image,
        FRAME_WIDTH as u32,
        FRAME_HEIGHT as u32,
        FilterType::Triangle,
    );

    let data = Array3::from_shape_fn((FRAME_HEIGHT, FRAME_WIDTH, CHANNELS), |(y, x, c)| {
        let pixel = resized.get_pixel(x as u32, y as u32);
        let channel = match order {
            ChannelOrder::Rgb => c,
            ChannelOrder::Bgr => CHANNELS - 1 - c,
        };
        pixel[channel] as f32 / 255.0
    });

    Ok(PreprocessedFrame { data })
}

/// Exactly [`SEQUENCE_LENGTH`] preprocessed frames, in capture order
#[derive(Debug, Clone)]
pub struct Sequence {
    data: Array4<f32>,
    pub source: SourceKind,
    pub completed_at: DateTime<Utc>,
}

impl Sequence {
    /// Stack a full window into one tensor
    pub fn from_frames(frames: &[PreprocessedFrame], source: SourceKind) -> Result<Self> {
        if frames.len() != SEQUENCE_LENGTH {
            return Err(Error::Preprocess(format!(
                "sequence needs {} frames, got {}",
                SEQUENCE_LENGTH,
                frames.len()
            )));
        }

        let views: Vec<_> = frames.iter().map(|f| f.data.view()).collect();
        let data = ndarray::stack(Axis(0), &views)
            .map_err(|e| Error::Preprocess(format!("cannot stack sequence: {}", e)))?;

        Ok(Self {
            data,
            source,
            completed_at: Utc::now(),
        })
    }

    pub fn len(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tensor shape as `[frames, height, width, channels]`
    pub fn shape(&self) -> [usize; 4] {
        let s = self.data.shape();
        [s[0], s[1], s[2], s[3]]
    }

    pub fn data(&self) -> &Array4<f32> {
        &self.data
    }

    /// Nested frames/rows/pixels/channels form for JSON model servers
    pub fn to_nested(&self) -> Vec<Vec<Vec<Vec<f32>>>> {
        self.data
            .outer_iter()
            .map(|frame| {
                frame
                    .outer_iter()
                    .map(|row| row.outer_iter().map(|px| px.to_vec()).collect())
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn solid(width: u32, height: u32, color: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb(color))
    }

    #[test]
    fn test_preprocess_shape_and_range() {
        let frame = preprocess(&solid(640, 480, [255, 0, 51]), ChannelOrder::Rgb).unwrap();
        assert_eq!(frame.data().shape(), &[FRAME_HEIGHT, FRAME_WIDTH, CHANNELS]);
        assert!(frame.data().iter().all(|v| (0.0..=1.0).contains(v)));
        assert!((frame.data()[[10, 10, 0]] - 1.0).abs() < 1e-6);
        assert!((frame.data()[[10, 10, 2]] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_bgr_order_swaps_red_and_blue() {
        let frame = preprocess(&solid(32, 32, [255, 0, 0]), ChannelOrder::Bgr).unwrap();
        assert_eq!(frame.data()[[0, 0, 0]], 0.0);
        assert_eq!(frame.data()[[0, 0, 2]], 1.0);
    }

    #[test]
    fn test_empty_image_rejected() {
        let result = preprocess(&RgbImage::new(0, 0), ChannelOrder::Bgr);
        assert!(matches!(result, Err(Error::Preprocess(_))));
    }

    #[test]
    fn test_sequence_requires_full_window() {
        let one = preprocess(&solid(8, 8, [1, 2, 3]), ChannelOrder::Rgb).unwrap();

        let short = vec![one.clone(); SEQUENCE_LENGTH - 1];
        assert!(Sequence::from_frames(&short, SourceKind::Webcam).is_err());

        let full = vec![one; SEQUENCE_LENGTH];
        let seq = Sequence::from_frames(&full, SourceKind::Webcam).unwrap();
        assert_eq!(seq.shape(), [SEQUENCE_LENGTH, FRAME_HEIGHT, FRAME_WIDTH, CHANNELS]);

        let nested = seq.to_nested();
        assert_eq!(nested.len(), SEQUENCE_LENGTH);
        assert_eq!(nested[0].len(), FRAME_HEIGHT);
        assert_eq!(nested[0][0].len(), FRAME_WIDTH);
        assert_eq!(nested[0][0][0].len(), CHANNELS);
    }

    #[test]
    fn test_channel_order_parse() {
        assert_eq!("RGB".parse::<ChannelOrder>(), Ok(ChannelOrder::Rgb));
        assert!("hsv".parse::<ChannelOrder>().is_err());
    }
}
