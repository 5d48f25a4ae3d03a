//! Server-Sent Events endpoints
//!
//! `/events` opens with the current settings and the recent alert log, then
//! follows the event bus. `/frames` streams rendered frames.

use crate::api::server::AppContext;
use crate::db;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{Stream, StreamExt};
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};
use vigil_common::events::VigilEvent;

fn to_sse_event(event: &VigilEvent) -> Option<Event> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Event::default().event(event.event_type()).data(json)),
        Err(e) => {
            warn!("Failed to serialize event: {}", e);
            None
        }
    }
}

/// GET /events - SSE event stream
pub async fn event_stream(
    State(ctx): State<AppContext>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!("New SSE client connected");

    // Subscribe before reading the snapshot so nothing falls in between
    let rx = ctx.events.subscribe();

    let settings = ctx.pipeline.settings();
    let alerts = match db::alerts::list_recent_alerts(&ctx.db_pool, db::alerts::RECENT_ALERTS_LIMIT)
        .await
    {
        Ok(alerts) => alerts,
        Err(e) => {
            warn!("Cannot load recent alerts for new client: {}", e);
            Vec::new()
        }
    };
    let initial = [
        VigilEvent::settings_changed(settings),
        VigilEvent::AlertLogs { alerts },
    ];

    let stream = async_stream::stream! {
        for event in &initial {
            if let Some(sse) = to_sse_event(event) {
                yield Ok::<_, Infallible>(sse);
            }
        }

        let mut live = BroadcastStream::new(rx);
        while let Some(result) = live.next().await {
            match result {
                Ok(event) => {
                    if let Some(sse) = to_sse_event(&event) {
                        debug!("Broadcasting SSE event: {}", event.event_type());
                        yield Ok(sse);
                    }
                }
                Err(e) => {
                    // Lagged: keep going from the newest events
                    warn!("SSE stream error: {:?}", e);
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// GET /frames - live annotated frames
pub async fn frame_stream(
    State(ctx): State<AppContext>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    ctx.frames.handle_sse_connection()
}
