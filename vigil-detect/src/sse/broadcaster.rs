//! Live frame broadcaster
//!
//! Annotated frames go out on their own channel, separate from control
//! events, so a slow frame consumer never delays an alert. Subscribers that
//! fall behind skip ahead to the newest frames.

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{Stream, StreamExt};
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info};

/// SSE event name for live frames
pub const FRAME_EVENT: &str = "Frame";

/// One rendered frame: base64 JPEG
#[derive(Debug, Clone, Serialize)]
pub struct LiveFrame {
    pub image: String,
}

#[derive(Clone)]
pub struct FrameBroadcaster {
    tx: broadcast::Sender<Arc<LiveFrame>>,
}

impl FrameBroadcaster {
    /// `capacity` frames are buffered per client before it starts skipping
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        info!("Frame broadcaster initialized with capacity {}", capacity);
        Self { tx }
    }

    /// Broadcast a frame to all connected clients
    ///
    /// Returns Ok(subscriber_count) if successful, or Err if no clients connected
    #[allow(clippy::result_large_err)]
    pub fn broadcast(
        &self,
        frame: LiveFrame,
    ) -> Result<usize, broadcast::error::SendError<Arc<LiveFrame>>> {
        self.tx.send(Arc::new(frame))
    }

    /// Broadcast a frame, ignoring if no clients are connected
    pub fn broadcast_lossy(&self, frame: LiveFrame) {
        let _ = self.tx.send(Arc::new(frame));
    }

    pub fn client_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<LiveFrame>> {
        self.tx.subscribe()
    }

    /// SSE stream for a new client connection
    pub fn subscribe_stream(&self) -> impl Stream<Item = Result<Event, Infallible>> {
        BroadcastStream::new(self.tx.subscribe()).filter_map(|result| async move {
            match result {
                Ok(frame) => Event::default()
                    .event(FRAME_EVENT)
                    .json_data(&*frame)
                    .ok()
                    .map(Ok),
                Err(e) => {
                    // Lagged: skip ahead
                    debug!("Frame client lagging: {:?}", e);
                    None
                }
            }
        })
    }

    /// Handler body for GET /frames
    pub fn handle_sse_connection(&self) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
        info!("New frame client connected, total clients: {}", self.client_count() + 1);

        Sse::new(self.subscribe_stream()).keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(15))
                .text("keep-alive"),
        )
    }
}
