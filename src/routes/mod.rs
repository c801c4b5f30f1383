pub mod api;
pub mod board;
pub mod events;

use axum::{extract::DefaultBodyLimit, Router};
use tower::ServiceBuilder;
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::state::AppState;

/// Room for multipart framing and the JSON envelope around an inlined image.
const BODY_OVERHEAD: usize = 64 * 1024;

pub fn create_router(state: AppState) -> Router {
    // base64 inflates an image by a third; leave room for it in JSON bodies
    let body_limit = state.config.max_image_bytes * 2 + BODY_OVERHEAD;
    Router::new()
        .merge(board::router())
        .nest("/api", api::router())
        .nest_service("/static", ServeDir::new("static"))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state)
}
