//! # Vigil Detect Library (vigil-detect)
//!
//! Real-time video behavior detection and alerting.
//!
//! **Purpose:** Capture frames from a webcam or an uploaded video, classify
//! fixed-length windows with a sequence classifier, and turn positive
//! detections into rate-limited alerts (live broadcast, persisted record,
//! optional clip, optional email/SMS).
//!
//! **Architecture:** ingestion thread → bounded detection queue → detection
//! worker task, sharing one mutex-guarded [`state::PipelineContext`]; axum
//! HTTP/SSE control surface on top.

pub mod api;
pub mod classifier;
pub mod config;
pub mod db;
pub mod error;
pub mod media;
pub mod notify;
pub mod pipeline;
pub mod sse;
pub mod state;

pub use error::{Error, Result};
pub use state::PipelineContext;
