//! Alert clip encoding
//!
//! Encoding is blocking; callers run it on `spawn_blocking`.

use crate::error::{Error, Result};
use crate::pipeline::frame::Frame;
use image::imageops::{self, FilterType};
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::debug;

/// Writes a sequence of frames to a video file
pub trait ClipEncoder: Send + Sync {
    fn encode(&self, frames: &[Frame], output: &Path, frame_rate: u32) -> Result<()>;
}

/// Pipes raw RGB frames into an external ffmpeg process (MPEG-4 Part 2 in mp4)
pub struct FfmpegClipEncoder {
    ffmpeg_path: String,
}

impl FfmpegClipEncoder {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    pub fn command_args(width: u32, height: u32, frame_rate: u32, output: &Path) -> Vec<String> {
        vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-y".into(),
            "-f".into(),
            "rawvideo".into(),
            "-pix_fmt".into(),
            "rgb24".into(),
            "-s".into(),
            format!("{}x{}", width, height),
            "-r".into(),
            frame_rate.to_string(),
            "-i".into(),
            "pipe:0".into(),
            "-c:v".into(),
            "mpeg4".into(),
            "-q:v".into(),
            "5".into(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            output.to_string_lossy().into_owned(),
        ]
    }
}

impl ClipEncoder for FfmpegClipEncoder {
    fn encode(&self, frames: &[Frame], output: &Path, frame_rate: u32) -> Result<()> {
        let first = frames
            .first()
            .ok_or_else(|| Error::Media("no frames to encode".into()))?;
        let (width, height) = (first.width(), first.height());

        let mut child = Command::new(&self.ffmpeg_path)
            .args(Self::command_args(width, height, frame_rate, output))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::Media(format!("cannot start {}: {}", self.ffmpeg_path, e)))?;

        let write_result = match child.stdin.take() {
            Some(mut stdin) => frames.iter().try_for_each(|frame| {
                if frame.width() == width && frame.height() == height {
                    stdin.write_all(frame.image.as_raw())
                } else {
                    let resized = imageops::resize(&*frame.image, width, height, FilterType::Triangle);
                    stdin.write_all(resized.as_raw())
                }
            }),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "ffmpeg stdin not captured",
            )),
        };

        let status = child.wait()?;
        write_result.map_err(|e| Error::Media(format!("clip write failed: {}", e)))?;
        if !status.success() {
            return Err(Error::Media(format!("ffmpeg exited with {}", status)));
        }

        debug!("Encoded {} frames to {}", frames.len(), output.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_command_args() {
        let args =
            FfmpegClipEncoder::command_args(640, 480, 30, &PathBuf::from("/tmp/clip.mp4"));
        let joined = args.join(" ");
        assert!(joined.contains("-s 640x480 -r 30 -i pipe:0"));
        assert!(joined.ends_with("/tmp/clip.mp4"));
    }

    #[test]
    fn test_empty_clip_rejected() {
        let encoder = FfmpegClipEncoder::new("ffmpeg");
        let result = encoder.encode(&[], Path::new("/tmp/never.mp4"), 30);
        assert!(matches!(result, Err(Error::Media(_))));
    }
}
