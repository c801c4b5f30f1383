use std::sync::Arc;

use tracing::{debug, info};

use crate::{
    error::{AppError, Rejection},
    models::{
        suggestion::{Suggestion, SuggestionFields},
        trip::{Trip, TripDraft},
    },
    services::{
        store::BoardStore,
        sync::{BoardSnapshot, Subscription, SyncHub},
    },
};

/// Trip directory and suggestion board operations.
///
/// Every write goes straight to the store and is followed by a fresh snapshot
/// on the [`SyncHub`]. Reads come from the latest published snapshot.
#[derive(Clone)]
pub struct BoardService {
    store: BoardStore,
    hub: SyncHub,
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

fn reject(rejection: Rejection) -> AppError {
    debug!(%rejection, "request rejected");
    AppError::Rejected(rejection)
}

fn check_fields(fields: &SuggestionFields) -> Result<(), AppError> {
    if is_blank(&fields.title) {
        return Err(reject(Rejection::BlankTitle));
    }
    if !fields.link_is_acceptable() {
        return Err(reject(Rejection::UnsafeLink));
    }
    Ok(())
}

impl BoardService {
    pub fn new(store: BoardStore, hub: SyncHub) -> Self {
        Self { store, hub }
    }

    /// Builds the service and publishes the board as it currently is in the store.
    pub async fn start(store: BoardStore) -> Result<Self, AppError> {
        let hub = SyncHub::load(&store).await?;
        Ok(Self::new(store, hub))
    }

    pub fn snapshot(&self) -> Arc<BoardSnapshot> {
        self.hub.current()
    }

    pub fn subscribe(&self) -> Subscription {
        self.hub.subscribe()
    }

    pub fn list_trips(&self) -> Vec<Trip> {
        self.snapshot().trips.clone()
    }

    pub fn list_suggestions(&self, trip_id: &str) -> Vec<Suggestion> {
        self.snapshot().suggestions_for(trip_id)
    }

    pub async fn create_trip(&self, draft: &TripDraft) -> Result<Trip, AppError> {
        if is_blank(&draft.name) {
            return Err(reject(Rejection::BlankTripName));
        }
        if is_blank(&draft.location) {
            return Err(reject(Rejection::BlankTripLocation));
        }
        let trip = self.store.insert_trip(draft).await?;
        info!(trip_id = %trip.id, name = %trip.name, "trip created");
        self.hub.refresh_after_write(&self.store).await;
        Ok(trip)
    }

    /// Deletes a trip together with all of its suggestion cards.
    ///
    /// Returns the number of cards removed. Unknown ids are a no-op.
    pub async fn delete_trip(&self, trip_id: &str) -> Result<usize, AppError> {
        let (trip_removed, cards_removed) = self.store.delete_trip_cascade(trip_id).await?;
        info!(trip_id, trip_removed, cards_removed, "trip deleted");
        self.hub.refresh_after_write(&self.store).await;
        Ok(cards_removed)
    }

    pub async fn create_suggestion(
        &self,
        trip_id: &str,
        fields: &SuggestionFields,
    ) -> Result<Suggestion, AppError> {
        check_fields(fields)?;
        if self.store.find_trip(trip_id).await?.is_none() {
            return Err(reject(Rejection::UnknownTrip));
        }
        let suggestion = self.store.insert_suggestion(trip_id, fields).await?;
        info!(
            trip_id,
            suggestion_id = %suggestion.id,
            category = %suggestion.category(),
            "suggestion created"
        );
        self.hub.refresh_after_write(&self.store).await;
        Ok(suggestion)
    }

    /// Replaces a card's editable fields. Identity, trip and votes are kept.
    pub async fn edit_suggestion(
        &self,
        suggestion_id: &str,
        fields: &SuggestionFields,
    ) -> Result<Suggestion, AppError> {
        check_fields(fields)?;
        if !self.store.update_suggestion(suggestion_id, fields).await? {
            return Err(reject(Rejection::UnknownSuggestion));
        }
        info!(suggestion_id, "suggestion edited");
        self.hub.refresh_after_write(&self.store).await;
        self.store
            .find_suggestion(suggestion_id)
            .await?
            .ok_or(AppError::NotFound)
    }

    pub async fn delete_suggestion(&self, suggestion_id: &str) -> Result<(), AppError> {
        let removed = self.store.delete_suggestion(suggestion_id).await?;
        info!(suggestion_id, removed, "suggestion deleted");
        self.hub.refresh_after_write(&self.store).await;
        Ok(())
    }

    /// Adds a named vote. A name can vote on a card only once.
    pub async fn vote(&self, suggestion_id: &str, voter: &str) -> Result<Suggestion, AppError> {
        if is_blank(voter) {
            return Err(reject(Rejection::BlankVoter));
        }
        let Some(card) = self.store.find_suggestion(suggestion_id).await? else {
            return Err(reject(Rejection::UnknownSuggestion));
        };
        if card.has_voted(voter) {
            return Err(reject(Rejection::AlreadyVoted));
        }
        // a concurrent duplicate can still land between the check and the insert
        if !self.store.add_vote(suggestion_id, voter).await? {
            return Err(reject(Rejection::AlreadyVoted));
        }
        info!(suggestion_id, voter, "vote recorded");
        self.hub.refresh_after_write(&self.store).await;
        self.store
            .find_suggestion(suggestion_id)
            .await?
            .ok_or(AppError::NotFound)
    }
}
