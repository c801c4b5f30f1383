use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::{Stream, StreamExt};
use tracing::debug;

use crate::state::AppState;

/// Server-sent stream of board snapshots.
///
/// The first event is the current board; every later event replaces it
/// wholesale. Closing the connection drops the subscription.
pub async fn stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    debug!("snapshot stream opened");
    let snapshots = state.board.subscribe().into_stream().map(|snapshot| {
        Event::default()
            .event("snapshot")
            .id(snapshot.version.to_string())
            .json_data(snapshot.as_ref())
    });
    Sse::new(snapshots).keep_alive(KeepAlive::default())
}
