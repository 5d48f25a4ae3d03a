//! Frame sources
//!
//! A [`FrameSource`] opens a [`CaptureHandle`] for the selected input. The
//! production backend runs an external `ffmpeg` process that writes raw
//! `rgb24` frames to stdout; the handle owns the child process and kills it
//! when dropped, which is how a source switch releases the device.

use crate::error::{Error, Result};
use image::RgbImage;
use std::io::{ErrorKind, Read};
use std::path::PathBuf;
use std::process::{Child, ChildStdout, Command, Stdio};
use tracing::{debug, info, warn};
use vigil_common::config::CaptureConfig;
use vigil_common::db::models::SourceKind;

/// Which input frames are read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSelection {
    Webcam,
    Upload(PathBuf),
}

impl SourceSelection {
    pub fn kind(&self) -> SourceKind {
        match self {
            SourceSelection::Webcam => SourceKind::Webcam,
            SourceSelection::Upload(_) => SourceKind::Upload,
        }
    }
}

/// An open capture
pub trait CaptureHandle: Send {
    /// Next frame, or `None` at end of stream
    fn read_frame(&mut self) -> Result<Option<RgbImage>>;

    /// Restart from the first frame (uploaded files loop)
    fn rewind(&mut self) -> Result<()>;
}

/// Opens capture handles
pub trait FrameSource: Send + Sync {
    fn open(&self, selection: &SourceSelection) -> Result<Box<dyn CaptureHandle>>;
}

/// ffmpeg-backed frame source
pub struct FfmpegSource {
    ffmpeg_path: String,
    webcam_device: String,
    width: u32,
    height: u32,
    frame_rate: u32,
}

impl FfmpegSource {
    pub fn new(capture: &CaptureConfig, frame_rate: u32) -> Self {
        Self {
            ffmpeg_path: capture.ffmpeg_path.clone(),
            webcam_device: capture.webcam_device.clone(),
            width: capture.width,
            height: capture.height,
            frame_rate,
        }
    }

    /// Arguments selecting the input
    fn input_args(&self, selection: &SourceSelection) -> Vec<String> {
        match selection {
            SourceSelection::Webcam => {
                let format = if cfg!(target_os = "linux") {
                    "v4l2"
                } else if cfg!(target_os = "macos") {
                    "avfoundation"
                } else {
                    "dshow"
                };
                let device = if cfg!(target_os = "windows") {
                    format!("video={}", self.webcam_device)
                } else {
                    self.webcam_device.clone()
                };
                vec![
                    "-f".into(),
                    format.into(),
                    "-framerate".into(),
                    self.frame_rate.to_string(),
                    "-i".into(),
                    device,
                ]
            }
            SourceSelection::Upload(path) => {
                vec!["-i".into(), path.to_string_lossy().into_owned()]
            }
        }
    }

    /// Full ffmpeg argument list producing scaled raw RGB frames on stdout
    pub fn command_args(&self, selection: &SourceSelection) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-nostdin".into(),
        ];
        args.extend(self.input_args(selection));
        let scale = format!("scale={}:{}", self.width, self.height);
        for arg in ["-an", "-vf", &scale, "-pix_fmt", "rgb24", "-f", "rawvideo", "pipe:1"] {
            args.push(arg.to_string());
        }
        args
    }
}

impl FrameSource for FfmpegSource {
    fn open(&self, selection: &SourceSelection) -> Result<Box<dyn CaptureHandle>> {
        if let SourceSelection::Upload(path) = selection {
            if !path.is_file() {
                return Err(Error::Capture(format!(
                    "uploaded video not found: {}",
                    path.display()
                )));
            }
        }

        let capture = FfmpegCapture::spawn(
            self.ffmpeg_path.clone(),
            self.command_args(selection),
            self.width,
            self.height,
        )?;
        info!("Opened {} capture ({}x{})", selection.kind(), self.width, self.height);
        Ok(Box::new(capture))
    }
}

struct FfmpegCapture {
    program: String,
    args: Vec<String>,
    width: u32,
    height: u32,
    child: Child,
    stdout: ChildStdout,
    frame_bytes: Vec<u8>,
}

impl FfmpegCapture {
    fn spawn(program: String, args: Vec<String>, width: u32, height: u32) -> Result<Self> {
        let (child, stdout) = Self::start(&program, &args)?;
        Ok(Self {
            program,
            args,
            width,
            height,
            child,
            stdout,
            frame_bytes: vec![0; (width * height * 3) as usize],
        })
    }

    fn start(program: &str, args: &[String]) -> Result<(Child, ChildStdout)> {
        debug!("Spawning {} {}", program, args.join(" "));
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::Capture(format!("cannot start {}: {}", program, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Capture("ffmpeg stdout not captured".into()))?;
        Ok((child, stdout))
    }

    fn stop(&mut self) {
        if let Err(e) = self.child.kill() {
            if e.kind() != ErrorKind::InvalidInput {
                warn!("Failed to stop capture process: {}", e);
            }
        }
        let _ = self.child.wait();
    }
}

impl CaptureHandle for FfmpegCapture {
    fn read_frame(&mut self) -> Result<Option<RgbImage>> {
        match self.stdout.read_exact(&mut self.frame_bytes) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(Error::Capture(format!("frame read failed: {}", e))),
        }

        RgbImage::from_raw(self.width, self.height, self.frame_bytes.clone())
            .map(Some)
            .ok_or_else(|| Error::Capture("frame buffer size mismatch".into()))
    }

    fn rewind(&mut self) -> Result<()> {
        self.stop();
        let (child, stdout) = Self::start(&self.program, &self.args)?;
        self.child = child;
        self.stdout = stdout;
        debug!("Capture rewound to start");
        Ok(())
    }
}

impl Drop for FfmpegCapture {
    fn drop(&mut self) {
        self.stop();
    }
}
