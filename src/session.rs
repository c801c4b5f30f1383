//! Per-visitor view model.
//!
//! A visitor's form buffers, open dialog and selection live in a [`ViewState`]
//! that only changes through [`ViewState::reduce`]. [`SessionStore`] keeps one
//! state per visitor and is the single place that applies actions.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};
use tokio::{sync::RwLock, task::JoinHandle};
use tracing::debug;
use uuid::Uuid;

use crate::models::{suggestion::SuggestionFields, trip::TripDraft};

pub const SESSION_COOKIE: &str = "tripboard_session";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Modal {
    #[default]
    Closed,
    NewTrip,
    /// `editing` is `None` for a card that is still a draft.
    Suggestion { editing: Option<String> },
    Vote { suggestion_id: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UploadState {
    #[default]
    Idle,
    InProgress { percent: u8 },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewState {
    pub selected_trip: Option<String>,
    pub modal: Modal,
    pub trip_draft: TripDraft,
    pub suggestion_draft: SuggestionFields,
    pub voter_name: String,
    pub upload: UploadState,
    /// Blocking message about a failed remote write.
    pub notice: Option<String>,
    /// Set once the first snapshot has been seen.
    pub synced: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    SnapshotArrived { trip_ids: Vec<String> },
    SelectTrip(String),
    OpenTripForm,
    EditTripDraft(TripDraft),
    TripCreated(String),
    TripDeleted(String),
    OpenNewSuggestion,
    OpenEditSuggestion { id: String, fields: SuggestionFields },
    EditSuggestionDraft(SuggestionFields),
    SuggestionSaved,
    ClearImage,
    UploadStarted,
    UploadProgress(u8),
    UploadFinished(String),
    UploadFailed,
    OpenVote(String),
    EditVoterName(String),
    VoteFinished,
    CloseModal,
    RemoteFailed(String),
    DismissNotice,
}

impl ViewState {
    pub fn reduce(mut self, action: Action) -> Self {
        match action {
            Action::SnapshotArrived { trip_ids } => {
                if !self.synced && self.selected_trip.is_none() {
                    self.selected_trip = trip_ids.into_iter().next();
                }
                self.synced = true;
            }
            Action::SelectTrip(id) => self.selected_trip = Some(id),
            Action::OpenTripForm => {
                self.reset_forms();
                self.modal = Modal::NewTrip;
            }
            Action::EditTripDraft(draft) => self.trip_draft = draft,
            Action::TripCreated(id) => {
                self.selected_trip = Some(id);
                self.close_modal();
            }
            Action::TripDeleted(id) => {
                if self.selected_trip.as_deref() == Some(id.as_str()) {
                    self.selected_trip = None;
                }
            }
            Action::OpenNewSuggestion => {
                self.reset_forms();
                self.modal = Modal::Suggestion { editing: None };
            }
            Action::OpenEditSuggestion { id, fields } => {
                self.reset_forms();
                self.suggestion_draft = fields;
                self.modal = Modal::Suggestion { editing: Some(id) };
            }
            Action::EditSuggestionDraft(fields) => self.suggestion_draft = fields,
            Action::SuggestionSaved | Action::VoteFinished | Action::CloseModal => {
                self.close_modal()
            }
            Action::ClearImage => self.suggestion_draft.image.clear(),
            Action::UploadStarted => self.upload = UploadState::InProgress { percent: 0 },
            Action::UploadProgress(percent) => {
                if let UploadState::InProgress { .. } = self.upload {
                    self.upload = UploadState::InProgress {
                        percent: percent.min(100),
                    };
                }
            }
            Action::UploadFinished(data_url) => {
                self.suggestion_draft.image = data_url;
                self.upload = UploadState::Idle;
            }
            Action::UploadFailed => self.upload = UploadState::Idle,
            Action::OpenVote(suggestion_id) => {
                self.reset_forms();
                self.modal = Modal::Vote { suggestion_id };
            }
            Action::EditVoterName(name) => self.voter_name = name,
            Action::RemoteFailed(cause) => self.notice = Some(cause),
            Action::DismissNotice => self.notice = None,
        }
        self
    }

    pub fn editing_suggestion(&self) -> Option<&str> {
        match &self.modal {
            Modal::Suggestion { editing } => editing.as_deref(),
            _ => None,
        }
    }

    pub fn voting_on(&self) -> Option<&str> {
        match &self.modal {
            Modal::Vote { suggestion_id } => Some(suggestion_id),
            _ => None,
        }
    }

    fn close_modal(&mut self) {
        self.modal = Modal::Closed;
        self.reset_forms();
    }

    fn reset_forms(&mut self) {
        self.trip_draft = TripDraft::default();
        self.suggestion_draft = SuggestionFields::default();
        self.voter_name.clear();
        self.upload = UploadState::Idle;
    }
}

struct Entry {
    view: ViewState,
    touched: Instant,
}

#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<Uuid, Entry>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn load(&self, id: Uuid) -> ViewState {
        self.inner
            .read()
            .await
            .get(&id)
            .map(|entry| entry.view.clone())
            .unwrap_or_default()
    }

    pub async fn dispatch(&self, id: Uuid, action: Action) -> ViewState {
        self.dispatch_from(id, ViewState::default, action).await
    }

    /// Applies `action`, starting a visitor without a session from `seed`.
    pub async fn dispatch_from(
        &self,
        id: Uuid,
        seed: impl FnOnce() -> ViewState,
        action: Action,
    ) -> ViewState {
        let mut sessions = self.inner.write().await;
        let view = match sessions.remove(&id) {
            Some(entry) => entry.view,
            None => seed(),
        }
        .reduce(action);
        sessions.insert(
            id,
            Entry {
                view: view.clone(),
                touched: Instant::now(),
            },
        );
        view
    }

    /// Like [`SessionStore::dispatch`] for a stored session, but a visitor
    /// without one gets the reduced default back and nothing is stored.
    pub async fn observe(&self, id: Uuid, action: Action) -> ViewState {
        let mut sessions = self.inner.write().await;
        match sessions.get_mut(&id) {
            Some(entry) => {
                entry.view = std::mem::take(&mut entry.view).reduce(action);
                entry.touched = Instant::now();
                entry.view.clone()
            }
            None => ViewState::default().reduce(action),
        }
    }

    /// Drops sessions untouched for at least `max_idle`. Returns how many went.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let mut sessions = self.inner.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| entry.touched.elapsed() < max_idle);
        before - sessions.len()
    }

    /// Runs [`SessionStore::evict_idle`] every `every` for the life of the process.
    pub fn spawn_sweeper(&self, max_idle: Duration, every: Duration) -> JoinHandle<()> {
        let sessions = self.clone();
        tokio::spawn(async move {
            let mut ticks = tokio::time::interval(every);
            loop {
                ticks.tick().await;
                let evicted = sessions.evict_idle(max_idle).await;
                if evicted > 0 {
                    debug!(evicted, "idle sessions evicted");
                }
            }
        })
    }

    pub async fn count(&self) -> usize {
        self.inner.read().await.len()
    }
}
