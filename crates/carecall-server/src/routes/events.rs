use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use std::convert::Infallible;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt as _;

use crate::observer::ChannelObserver;
use crate::state::AppState;

/// GET /api/events: SSE stream of `status` events, one per queue snapshot.
/// The current status is sent first so a fresh console never starts blank.
pub async fn sse_events(State(app): State<AppState>) -> impl axum::response::IntoResponse {
    let (observer, rx) = ChannelObserver::channel(app.config.broadcast.observer_buffer);
    let (observer_id, initial) = app.runtime.subscribe(Box::new(observer));
    tracing::debug!(observer_id, "status stream opened");

    let stream = tokio_stream::once(initial)
        .chain(ReceiverStream::new(rx))
        .filter_map(|snapshot| {
            Event::default()
                .event("status")
                .json_data(&snapshot)
                .ok()
                .map(Ok::<Event, Infallible>)
        });
    Sse::new(stream).keep_alive(KeepAlive::default())
}
