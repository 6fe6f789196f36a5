//! Server-sent stream of lifecycle event envelopes for the caller's organization.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::Stream;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use crate::AppState;
use crate::identity::Identity;

fn belongs_to(message: &str, organization_id: Uuid) -> bool {
    serde_json::from_str::<serde_json::Value>(message)
        .ok()
        .and_then(|v| v.get("org_id").and_then(|o| o.as_str()).and_then(|o| Uuid::parse_str(o).ok()))
        .is_some_and(|org| org == organization_id)
}

pub async fn sse_events(
    State(state): State<Arc<AppState>>,
    Identity(actor): Identity,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.event_tx.subscribe();
    let organization_id = actor.organization_id;
    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(msg) => {
                    if belongs_to(&msg, organization_id) {
                        yield Ok(Event::default().event("voice").data(msg));
                    }
                },
                Err(RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "SSE client lagged");
                },
                Err(RecvError::Closed) => break,
            }
        }
    };
    Sse::new(stream).keep_alive(KeepAlive::default())
}
