//! Real-time detection pipeline
//!
//! Frame source → ring buffer (clip history) and sequence assembler →
//! detection queue → detection worker → notification dispatcher.

pub mod assembler;
pub mod frame;
pub mod ingest;
pub mod queue;
pub mod render;
pub mod ring_buffer;
pub mod source;
pub mod worker;

pub use assembler::SequenceAssembler;
pub use frame::{ChannelOrder, Frame, Sequence};
pub use ingest::{IngestLoop, StepOutcome};
pub use queue::DetectionQueue;
pub use source::{FfmpegSource, FrameSource, SourceSelection};
pub use worker::{AlertGate, DetectionWorker, SequenceOutcome};
