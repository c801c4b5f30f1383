use askama::Template;
use askama_axum::IntoResponse as AskamaTemplateResponse;
use axum::{
    extract::{Multipart, Path, State},
    http::{header::CONTENT_LENGTH, HeaderMap},
    response::{IntoResponse, Redirect},
    routing::{get, post},
    Form, Router,
};
use axum_extra::extract::cookie::PrivateCookieJar;
use serde::Deserialize;
use serde_json::{Map, Value};
use serde_with::{serde_as, NoneAsEmptyString};
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use crate::{
    error::{AppError, Rejection},
    models::{
        suggestion::{Category, Suggestion, SuggestionFields},
        trip::{Trip, TripDraft},
    },
    ranking::RankedView,
    services::{
        sync::BoardSnapshot,
        upload::{encode_data_url, UploadError},
    },
    session::{Action, Modal, UploadState, ViewState},
    state::AppState,
    visitor::Visitor,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(board_page))
        .route("/trips", post(create_trip))
        .route("/trips/:id/select", post(select_trip))
        .route("/trips/:id/delete", post(delete_trip))
        .route("/modal/trip", post(open_trip_form))
        .route("/modal/close", post(close_modal))
        .route("/suggestions", post(save_suggestion))
        .route("/suggestions/new", post(open_new_suggestion))
        .route("/suggestions/image", post(upload_image))
        .route("/suggestions/image/clear", post(clear_image))
        .route("/suggestions/:id/edit", post(open_edit_suggestion))
        .route("/suggestions/:id/delete", post(delete_suggestion))
        .route("/suggestions/:id/vote", post(open_vote))
        .route("/votes", post(submit_vote))
        .route("/notice/dismiss", post(dismiss_notice))
}

type Reply = (PrivateCookieJar, Redirect);

fn back_to_board(visitor: Visitor) -> Reply {
    (visitor.jar, Redirect::to("/"))
}

/// The view a visitor without a stored session was shown by `GET /`.
fn first_view(snapshot: &BoardSnapshot) -> ViewState {
    ViewState::default().reduce(Action::SnapshotArrived {
        trip_ids: snapshot.trip_ids(),
    })
}

async fn apply(state: &AppState, visitor: Uuid, action: Action) -> ViewState {
    let snapshot = state.board.snapshot();
    apply_to_shown(state, visitor, &snapshot, action).await
}

/// Like [`apply`] for a board `shown` before a write replaced the snapshot.
async fn apply_to_shown(
    state: &AppState,
    visitor: Uuid,
    shown: &BoardSnapshot,
    action: Action,
) -> ViewState {
    state
        .sessions
        .dispatch_from(visitor, || first_view(shown), action)
        .await
}

/// Outcome of a write as seen from the board page.
enum Settled<T> {
    Done(T),
    Refused(Rejection),
    Failed,
}

/// Rejections are dropped without a trace on the page; any other failure
/// becomes the visitor's notice.
async fn settle<T>(state: &AppState, visitor: Uuid, result: Result<T, AppError>) -> Settled<T> {
    match result {
        Ok(value) => Settled::Done(value),
        Err(err) => match err.rejection() {
            Some(rejection) => Settled::Refused(rejection),
            None => {
                warn!("board write failed: {err}");
                apply(
                    state,
                    visitor,
                    Action::RemoteFailed(format!("Saving failed: {err}")),
                )
                .await;
                Settled::Failed
            }
        },
    }
}

#[derive(Clone)]
struct TripRow {
    id: String,
    name: String,
    location: String,
    dates: String,
    selected: bool,
}

impl TripRow {
    fn new(trip: &Trip, selected: Option<&str>) -> Self {
        Self {
            id: trip.id.clone(),
            name: trip.name.clone(),
            location: trip.location.clone(),
            dates: trip.date_range(),
            selected: selected == Some(trip.id.as_str()),
        }
    }
}

#[derive(Clone)]
struct CardView {
    id: String,
    title: String,
    location: String,
    description: String,
    image_src: String,
    has_link: bool,
    link: String,
    vote_count: usize,
    initials: Vec<String>,
    hidden_voters: usize,
}

impl CardView {
    fn new(card: &Suggestion, placeholder: &str) -> Self {
        let link = card.web_link().unwrap_or_default().to_string();
        Self {
            id: card.id.clone(),
            title: card.fields.title.clone(),
            location: card.fields.location.clone(),
            description: card.fields.description.clone(),
            image_src: card.image_src(placeholder).to_string(),
            has_link: !link.is_empty(),
            link,
            vote_count: card.vote_count(),
            initials: card.voter_initials(),
            hidden_voters: card.hidden_voter_count(),
        }
    }
}

#[derive(Clone)]
struct ColumnView {
    label: &'static str,
    cards: Vec<CardView>,
}

#[derive(Clone)]
struct CategoryOption {
    value: &'static str,
    label: &'static str,
    selected: bool,
}

#[derive(Template)]
#[template(path = "board.html")]
struct BoardTemplate {
    version: u64,
    trips: Vec<TripRow>,
    has_trip: bool,
    trip: TripRow,
    columns: Vec<ColumnView>,
    modal: &'static str,
    editing: bool,
    trip_draft: TripDraft,
    draft: SuggestionFields,
    draft_has_image: bool,
    categories: Vec<CategoryOption>,
    uploading: bool,
    upload_percent: u8,
    vote_title: String,
    has_notice: bool,
    notice: String,
}

async fn board_page(State(state): State<AppState>, visitor: Visitor) -> impl IntoResponse {
    let snapshot = state.board.snapshot();
    let view = state
        .sessions
        .observe(
            visitor.id,
            Action::SnapshotArrived {
                trip_ids: snapshot.trip_ids(),
            },
        )
        .await;

    let selected = view.selected_trip.as_deref();
    let trips: Vec<TripRow> = snapshot
        .trips
        .iter()
        .map(|trip| TripRow::new(trip, selected))
        .collect();
    let current = selected.and_then(|id| snapshot.trip(id));

    let cards = current
        .map(|trip| snapshot.suggestions_for(&trip.id))
        .unwrap_or_default();
    let ranked = RankedView::build(&cards);
    let placeholder = state.config.placeholder_image_url.as_str();
    let columns = ranked
        .buckets
        .iter()
        .map(|bucket| ColumnView {
            label: bucket.category.label(),
            cards: bucket
                .cards
                .iter()
                .map(|card| CardView::new(card, placeholder))
                .collect(),
        })
        .collect();

    let vote_title = view
        .voting_on()
        .and_then(|id| snapshot.suggestion(id))
        .map(|card| card.fields.title.clone())
        .unwrap_or_default();

    let template = BoardTemplate {
        version: snapshot.version,
        trips,
        has_trip: current.is_some(),
        trip: current
            .map(|trip| TripRow::new(trip, selected))
            .unwrap_or(TripRow {
                id: String::new(),
                name: String::new(),
                location: String::new(),
                dates: String::new(),
                selected: false,
            }),
        columns,
        modal: modal_name(&view),
        editing: view.editing_suggestion().is_some(),
        categories: category_options(view.suggestion_draft.category),
        draft_has_image: !view.suggestion_draft.image.is_empty(),
        uploading: matches!(view.upload, UploadState::InProgress { .. }),
        upload_percent: match view.upload {
            UploadState::InProgress { percent } => percent,
            UploadState::Idle => 0,
        },
        vote_title,
        has_notice: view.notice.is_some(),
        notice: view.notice.clone().unwrap_or_default(),
        trip_draft: view.trip_draft,
        draft: view.suggestion_draft,
    };

    (visitor.jar, AskamaTemplateResponse::into_response(template))
}

fn modal_name(view: &ViewState) -> &'static str {
    match view.modal {
        Modal::Closed => "closed",
        Modal::NewTrip => "trip",
        Modal::Suggestion { .. } => "suggestion",
        Modal::Vote { .. } => "vote",
    }
}

fn category_options(current: Category) -> Vec<CategoryOption> {
    Category::ALL
        .into_iter()
        .map(|category| CategoryOption {
            value: category.as_str(),
            label: category.label(),
            selected: category == current,
        })
        .collect()
}

async fn create_trip(
    State(state): State<AppState>,
    visitor: Visitor,
    Form(draft): Form<TripDraft>,
) -> Reply {
    apply(&state, visitor.id, Action::EditTripDraft(draft.clone())).await;
    let result = state.board.create_trip(&draft).await;
    if let Settled::Done(trip) = settle(&state, visitor.id, result).await {
        apply(&state, visitor.id, Action::TripCreated(trip.id)).await;
    }
    back_to_board(visitor)
}

async fn select_trip(
    State(state): State<AppState>,
    visitor: Visitor,
    Path(trip_id): Path<String>,
) -> Reply {
    apply(&state, visitor.id, Action::SelectTrip(trip_id)).await;
    back_to_board(visitor)
}

async fn delete_trip(
    State(state): State<AppState>,
    visitor: Visitor,
    Path(trip_id): Path<String>,
) -> Reply {
    let shown = state.board.snapshot();
    let result = state.board.delete_trip(&trip_id).await;
    if let Settled::Done(_) = settle(&state, visitor.id, result).await {
        apply_to_shown(&state, visitor.id, &shown, Action::TripDeleted(trip_id)).await;
    }
    back_to_board(visitor)
}

async fn open_trip_form(State(state): State<AppState>, visitor: Visitor) -> Reply {
    apply(&state, visitor.id, Action::OpenTripForm).await;
    back_to_board(visitor)
}

async fn close_modal(State(state): State<AppState>, visitor: Visitor) -> Reply {
    apply(&state, visitor.id, Action::CloseModal).await;
    back_to_board(visitor)
}

async fn open_new_suggestion(State(state): State<AppState>, visitor: Visitor) -> Reply {
    apply(&state, visitor.id, Action::OpenNewSuggestion).await;
    back_to_board(visitor)
}

async fn open_edit_suggestion(
    State(state): State<AppState>,
    visitor: Visitor,
    Path(suggestion_id): Path<String>,
) -> Reply {
    let snapshot = state.board.snapshot();
    if let Some(card) = snapshot.suggestion(&suggestion_id) {
        let action = Action::OpenEditSuggestion {
            id: card.id.clone(),
            fields: card.fields.clone(),
        };
        apply(&state, visitor.id, action).await;
    }
    back_to_board(visitor)
}

#[serde_as]
#[derive(Deserialize)]
struct SuggestionForm {
    #[serde(default)]
    category: Category,
    #[serde(default)]
    title: String,
    #[serde(default)]
    location: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    link: String,
    /// Overrides any uploaded image when filled in.
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    image_url: Option<String>,
}

impl SuggestionForm {
    fn into_fields(self, current_image: String) -> SuggestionFields {
        SuggestionFields {
            category: self.category,
            title: self.title,
            location: self.location,
            description: self.description,
            image: self.image_url.unwrap_or(current_image),
            link: self.link,
        }
    }
}

/// Keeps what the visitor typed so far in the session draft.
async fn keep_draft(state: &AppState, visitor: Uuid, form: SuggestionForm) -> ViewState {
    let current_image = state.sessions.load(visitor).await.suggestion_draft.image;
    apply(
        state,
        visitor,
        Action::EditSuggestionDraft(form.into_fields(current_image)),
    )
    .await
}

async fn save_suggestion(
    State(state): State<AppState>,
    visitor: Visitor,
    Form(form): Form<SuggestionForm>,
) -> Reply {
    if !matches!(state.sessions.load(visitor.id).await.modal, Modal::Suggestion { .. }) {
        return back_to_board(visitor);
    }
    let view = keep_draft(&state, visitor.id, form).await;
    let fields = &view.suggestion_draft;

    let result = match (view.editing_suggestion(), view.selected_trip.as_deref()) {
        (Some(id), _) => state.board.edit_suggestion(id, fields).await,
        (None, Some(trip_id)) => state.board.create_suggestion(trip_id, fields).await,
        (None, None) => Err(AppError::Rejected(Rejection::UnknownTrip)),
    };
    if let Settled::Done(_) = settle(&state, visitor.id, result).await {
        apply(&state, visitor.id, Action::SuggestionSaved).await;
    }
    back_to_board(visitor)
}

/// Receives the suggestion form with its `image` file part.
///
/// The text fields land in the draft whatever happens to the image; a bad
/// image only resets the upload state.
async fn upload_image(
    State(state): State<AppState>,
    visitor: Visitor,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Reply {
    apply(&state, visitor.id, Action::UploadStarted).await;

    let expected = headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok());
    let mut text = Map::new();
    let outcome = match read_upload(&state, visitor.id, expected, &mut multipart, &mut text).await {
        Ok(data_url) => Action::UploadFinished(data_url),
        Err(err) => {
            warn!("image upload discarded: {err}");
            Action::UploadFailed
        }
    };

    if !text.is_empty() {
        match serde_json::from_value::<SuggestionForm>(Value::Object(text)) {
            Ok(form) => {
                keep_draft(&state, visitor.id, form).await;
            }
            Err(err) => warn!("suggestion fields in upload ignored: {err}"),
        }
    }
    apply(&state, visitor.id, outcome).await;
    back_to_board(visitor)
}

/// Percent of the upload reached once the body has been received; encoding
/// covers the rest.
const RECEIVED_PERCENT: usize = 50;

async fn read_upload(
    state: &AppState,
    visitor: Uuid,
    expected: Option<usize>,
    multipart: &mut Multipart,
    text: &mut Map<String, Value>,
) -> Result<String, AppError> {
    let mut image = None;
    while let Some(mut field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        if name != "image" {
            text.insert(name, Value::String(field.text().await?));
            continue;
        }

        let content_type = field.content_type().unwrap_or_default().to_string();
        let mut bytes = Vec::new();
        let mut shown = 0;
        while let Some(chunk) = field.chunk().await? {
            bytes.extend_from_slice(&chunk);
            let Some(total) = expected.filter(|total| *total > 0) else {
                continue;
            };
            let percent = (bytes.len() * RECEIVED_PERCENT / total).min(RECEIVED_PERCENT);
            if percent > shown {
                shown = percent;
                apply(state, visitor, Action::UploadProgress(percent as u8)).await;
            }
        }
        image = Some((content_type, bytes));
    }
    let (content_type, bytes) = image.ok_or(UploadError::Empty)?;

    let max_bytes = state.config.max_image_bytes;
    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
    let encoding = tokio::task::spawn_blocking(move || {
        encode_data_url(&content_type, &bytes, max_bytes, |percent| {
            let _ = progress_tx.send(percent);
        })
    });
    while let Some(percent) = progress_rx.recv().await {
        let overall = RECEIVED_PERCENT + usize::from(percent) * (100 - RECEIVED_PERCENT) / 100;
        apply(state, visitor, Action::UploadProgress(overall as u8)).await;
    }

    let data_url = encoding
        .await
        .map_err(|err| AppError::Other(err.into()))??;
    Ok(data_url)
}

async fn clear_image(
    State(state): State<AppState>,
    visitor: Visitor,
    Form(form): Form<SuggestionForm>,
) -> Reply {
    keep_draft(&state, visitor.id, form).await;
    apply(&state, visitor.id, Action::ClearImage).await;
    back_to_board(visitor)
}

async fn delete_suggestion(
    State(state): State<AppState>,
    visitor: Visitor,
    Path(suggestion_id): Path<String>,
) -> Reply {
    let result = state.board.delete_suggestion(&suggestion_id).await;
    settle(&state, visitor.id, result).await;
    back_to_board(visitor)
}

async fn open_vote(
    State(state): State<AppState>,
    visitor: Visitor,
    Path(suggestion_id): Path<String>,
) -> Reply {
    apply(&state, visitor.id, Action::OpenVote(suggestion_id)).await;
    back_to_board(visitor)
}

#[derive(Deserialize)]
struct VoteForm {
    #[serde(default)]
    voter_name: String,
}

async fn submit_vote(
    State(state): State<AppState>,
    visitor: Visitor,
    Form(form): Form<VoteForm>,
) -> Reply {
    let view = apply(&state, visitor.id, Action::EditVoterName(form.voter_name)).await;
    let Some(suggestion_id) = view.voting_on() else {
        return back_to_board(visitor);
    };

    let result = state.board.vote(suggestion_id, &view.voter_name).await;
    match settle(&state, visitor.id, result).await {
        // the dialog stays open until a name is typed
        Settled::Refused(Rejection::BlankVoter) | Settled::Failed => {}
        Settled::Done(_) | Settled::Refused(_) => {
            apply(&state, visitor.id, Action::VoteFinished).await;
        }
    }
    back_to_board(visitor)
}

async fn dismiss_notice(State(state): State<AppState>, visitor: Visitor) -> Reply {
    apply(&state, visitor.id, Action::DismissNotice).await;
    back_to_board(visitor)
}
