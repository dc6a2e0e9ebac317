//! `GET /events`: one Server-Sent Events stream per subscriber.
//!
//! Frames: `: connected` first, then one `data: <json>` per domain event,
//! with `: heartbeat` comments while idle. The stream ends when the client
//! goes away or the broadcaster is closed on shutdown.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use harness_core::event::{DomainEvent, Subscription};
use tokio_stream::StreamExt;
use tracing::info;

use crate::SharedState;

/// A subscription that logs its client's disconnect.
struct Connection {
    subscription: Subscription,
    connected_at: Instant,
}

impl Stream for Connection {
    type Item = Arc<DomainEvent>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().subscription).poll_next(cx)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        info!(
            client_id = self.subscription.id(),
            duration_s = self.connected_at.elapsed().as_secs(),
            "SSE client disconnected"
        );
    }
}

pub(crate) async fn events_handler(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let subscription = state.events.subscribe();
    info!(client_id = subscription.id(), "SSE client connected");

    let connection = Connection {
        subscription,
        connected_at: Instant::now(),
    };
    let frames = tokio_stream::once(Ok(Event::default().comment("connected"))).chain(
        connection.map(|event| Event::default().json_data(event.as_ref())),
    );

    Sse::new(frames).keep_alive(
        KeepAlive::new()
            .interval(state.heartbeat)
            .text("heartbeat"),
    )
}
