use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{FromRow, Row};
use tracing::debug;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        suggestion::{Category, Suggestion, SuggestionFields},
        trip::{Trip, TripDraft},
    },
};

/// SQLite-backed document store for trips, suggestion cards and their votes.
///
/// This is the source of truth shared by every connected client. It performs
/// no validation; callers go through [`crate::services::board::BoardService`].
#[derive(Clone)]
pub struct BoardStore {
    db: DbPool,
}

#[derive(FromRow)]
struct SuggestionRow {
    id: String,
    trip_id: String,
    category: Category,
    title: String,
    location: String,
    description: String,
    image: String,
    link: String,
}

impl SuggestionRow {
    fn into_suggestion(self, votes: Vec<String>) -> Suggestion {
        Suggestion {
            id: self.id,
            trip_id: self.trip_id,
            fields: SuggestionFields {
                category: self.category,
                title: self.title,
                location: self.location,
                description: self.description,
                image: self.image,
                link: self.link,
            },
            votes,
        }
    }
}

const SUGGESTION_COLUMNS: &str =
    "id, trip_id, category, title, location, description, image, link";

impl BoardStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    pub async fn list_trips(&self) -> Result<Vec<Trip>, AppError> {
        let trips = sqlx::query_as::<_, Trip>(
            "SELECT id, name, location, start_date, end_date, created_at FROM trips ORDER BY created_at, rowid",
        )
        .fetch_all(&self.db)
        .await?;
        Ok(trips)
    }

    pub async fn find_trip(&self, id: &str) -> Result<Option<Trip>, AppError> {
        let trip = sqlx::query_as::<_, Trip>(
            "SELECT id, name, location, start_date, end_date, created_at FROM trips WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(trip)
    }

    pub async fn insert_trip(&self, draft: &TripDraft) -> Result<Trip, AppError> {
        let trip = Trip {
            id: Uuid::new_v4().to_string(),
            name: draft.name.clone(),
            location: draft.location.clone(),
            start_date: draft.start_date.clone(),
            end_date: draft.end_date.clone(),
            created_at: Utc::now(),
        };
        sqlx::query(
            "INSERT INTO trips (id, name, location, start_date, end_date, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&trip.id)
        .bind(&trip.name)
        .bind(&trip.location)
        .bind(&trip.start_date)
        .bind(&trip.end_date)
        .bind(trip.created_at)
        .execute(&self.db)
        .await?;
        Ok(trip)
    }

    /// Removes a trip and every card referencing it in one transaction.
    ///
    /// Returns `(trip_removed, cards_removed)`.
    pub async fn delete_trip_cascade(&self, trip_id: &str) -> Result<(bool, usize), AppError> {
        let mut tx = self.db.begin().await?;

        let card_ids: Vec<String> =
            sqlx::query_scalar("SELECT id FROM suggestions WHERE trip_id = ?1")
                .bind(trip_id)
                .fetch_all(&mut *tx)
                .await?;

        let trip_removed = sqlx::query("DELETE FROM trips WHERE id = ?1")
            .bind(trip_id)
            .execute(&mut *tx)
            .await?
            .rows_affected()
            > 0;

        for card_id in &card_ids {
            sqlx::query("DELETE FROM suggestion_votes WHERE suggestion_id = ?1")
                .bind(card_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM suggestions WHERE id = ?1")
                .bind(card_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        debug!(trip_id, cards = card_ids.len(), "trip cascade committed");
        Ok((trip_removed, card_ids.len()))
    }

    pub async fn list_all_suggestions(&self) -> Result<Vec<Suggestion>, AppError> {
        let rows = sqlx::query_as::<_, SuggestionRow>(&format!(
            "SELECT {SUGGESTION_COLUMNS} FROM suggestions ORDER BY created_at, rowid"
        ))
        .fetch_all(&self.db)
        .await?;
        let votes = sqlx::query("SELECT suggestion_id, voter FROM suggestion_votes ORDER BY seq")
            .fetch_all(&self.db)
            .await?;
        Ok(attach_votes(rows, votes))
    }

    pub async fn find_suggestion(&self, id: &str) -> Result<Option<Suggestion>, AppError> {
        let Some(row) = sqlx::query_as::<_, SuggestionRow>(&format!(
            "SELECT {SUGGESTION_COLUMNS} FROM suggestions WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        else {
            return Ok(None);
        };
        let votes = sqlx::query_scalar(
            "SELECT voter FROM suggestion_votes WHERE suggestion_id = ?1 ORDER BY seq",
        )
        .bind(id)
        .fetch_all(&self.db)
        .await?;
        Ok(Some(row.into_suggestion(votes)))
    }

    pub async fn insert_suggestion(
        &self,
        trip_id: &str,
        fields: &SuggestionFields,
    ) -> Result<Suggestion, AppError> {
        let id = Uuid::new_v4().to_string();
        let created_at: DateTime<Utc> = Utc::now();
        sqlx::query(
            "INSERT INTO suggestions (id, trip_id, category, title, location, description, image, link, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(&id)
        .bind(trip_id)
        .bind(fields.category)
        .bind(&fields.title)
        .bind(&fields.location)
        .bind(&fields.description)
        .bind(&fields.image)
        .bind(&fields.link)
        .bind(created_at)
        .execute(&self.db)
        .await?;
        Ok(Suggestion {
            id,
            trip_id: trip_id.to_string(),
            fields: fields.clone(),
            votes: Vec::new(),
        })
    }

    /// Replaces the editable fields. Returns `false` when no card has this id.
    pub async fn update_suggestion(
        &self,
        id: &str,
        fields: &SuggestionFields,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE suggestions SET category = ?2, title = ?3, location = ?4, description = ?5, image = ?6, link = ?7 \
             WHERE id = ?1",
        )
        .bind(id)
        .bind(fields.category)
        .bind(&fields.title)
        .bind(&fields.location)
        .bind(&fields.description)
        .bind(&fields.image)
        .bind(&fields.link)
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_suggestion(&self, id: &str) -> Result<bool, AppError> {
        let mut tx = self.db.begin().await?;
        sqlx::query("DELETE FROM suggestion_votes WHERE suggestion_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let removed = sqlx::query("DELETE FROM suggestions WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected()
            > 0;
        tx.commit().await?;
        Ok(removed)
    }

    /// Adds `voter` to the card's vote set.
    ///
    /// The unique index makes this an atomic add-to-set: concurrent distinct
    /// voters are all kept and a duplicate is ignored. Returns `true` when the
    /// vote was new.
    pub async fn add_vote(&self, suggestion_id: &str, voter: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO suggestion_votes (suggestion_id, voter, voted_at) VALUES (?1, ?2, ?3)",
        )
        .bind(suggestion_id)
        .bind(voter)
        .bind(Utc::now())
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

fn attach_votes(rows: Vec<SuggestionRow>, votes: Vec<sqlx::sqlite::SqliteRow>) -> Vec<Suggestion> {
    let mut by_card: HashMap<String, Vec<String>> = HashMap::new();
    for vote in votes {
        by_card
            .entry(vote.get("suggestion_id"))
            .or_default()
            .push(vote.get("voter"));
    }
    rows.into_iter()
        .map(|row| {
            let votes = by_card.remove(&row.id).unwrap_or_default();
            row.into_suggestion(votes)
        })
        .collect()
}
