//! HTTP control surface
//!
//! REST endpoints for control events, uploads and alert queries, plus two
//! SSE streams: `/events` (control and alert events) and `/frames` (live
//! annotated frames).

pub mod control;
pub mod handlers;
pub mod server;
pub mod sse;
pub mod upload;

pub use control::ControlEvent;
pub use server::{create_router, run, AppContext};
