use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::AppError,
    models::{
        suggestion::{Suggestion, SuggestionFields},
        trip::{Trip, TripDraft},
    },
    ranking::RankedView,
    routes::events,
    session::ViewState,
    state::AppState,
    visitor::Visitor,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/trips", get(list_trips).post(create_trip))
        .route("/trips/:id", delete(delete_trip))
        .route(
            "/trips/:id/suggestions",
            get(list_suggestions).post(create_suggestion),
        )
        .route("/trips/:id/board", get(ranked_board))
        .route(
            "/suggestions/:id",
            put(edit_suggestion).delete(delete_suggestion),
        )
        .route("/suggestions/:id/votes", post(vote))
        .route("/session", get(session_view))
        .route("/events", get(events::stream))
}

async fn list_trips(State(state): State<AppState>) -> Json<Vec<Trip>> {
    Json(state.board.list_trips())
}

async fn create_trip(
    State(state): State<AppState>,
    Json(draft): Json<TripDraft>,
) -> Result<(StatusCode, Json<Trip>), AppError> {
    let trip = state.board.create_trip(&draft).await?;
    Ok((StatusCode::CREATED, Json(trip)))
}

#[derive(Serialize)]
struct TripDeleted {
    removed_suggestions: usize,
}

async fn delete_trip(
    State(state): State<AppState>,
    Path(trip_id): Path<String>,
) -> Result<Json<TripDeleted>, AppError> {
    let removed_suggestions = state.board.delete_trip(&trip_id).await?;
    Ok(Json(TripDeleted {
        removed_suggestions,
    }))
}

async fn list_suggestions(
    State(state): State<AppState>,
    Path(trip_id): Path<String>,
) -> Json<Vec<Suggestion>> {
    Json(state.board.list_suggestions(&trip_id))
}

async fn create_suggestion(
    State(state): State<AppState>,
    Path(trip_id): Path<String>,
    Json(fields): Json<SuggestionFields>,
) -> Result<(StatusCode, Json<Suggestion>), AppError> {
    let suggestion = state.board.create_suggestion(&trip_id, &fields).await?;
    Ok((StatusCode::CREATED, Json(suggestion)))
}

/// The trip and its cards grouped per category, most voted first.
///
/// An unknown trip id yields `trip: null` and empty columns.
async fn ranked_board(
    State(state): State<AppState>,
    Path(trip_id): Path<String>,
) -> Json<Value> {
    let snapshot = state.board.snapshot();
    let cards = snapshot.suggestions_for(&trip_id);
    let view = RankedView::build(&cards);
    let body = serde_json::json!({
        "trip": snapshot.trip(&trip_id),
        "columns": view.buckets,
    });
    Json(body)
}

async fn edit_suggestion(
    State(state): State<AppState>,
    Path(suggestion_id): Path<String>,
    Json(fields): Json<SuggestionFields>,
) -> Result<Json<Suggestion>, AppError> {
    let suggestion = state.board.edit_suggestion(&suggestion_id, &fields).await?;
    Ok(Json(suggestion))
}

async fn delete_suggestion(
    State(state): State<AppState>,
    Path(suggestion_id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.board.delete_suggestion(&suggestion_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct VoteRequest {
    voter: String,
}

async fn vote(
    State(state): State<AppState>,
    Path(suggestion_id): Path<String>,
    Json(request): Json<VoteRequest>,
) -> Result<Json<Suggestion>, AppError> {
    let suggestion = state.board.vote(&suggestion_id, &request.voter).await?;
    Ok(Json(suggestion))
}

async fn session_view(State(state): State<AppState>, visitor: Visitor) -> impl IntoResponse {
    let view: ViewState = state.sessions.load(visitor.id).await;
    (visitor.jar, Json(view))
}
