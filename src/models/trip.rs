use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Trip {
    pub id: String,
    pub name: String,
    pub location: String,
    /// ISO date as entered; not parsed.
    pub start_date: String,
    pub end_date: String,
    pub created_at: DateTime<Utc>,
}

impl Trip {
    pub fn date_range(&self) -> String {
        match (self.start_date.is_empty(), self.end_date.is_empty()) {
            (true, true) => String::new(),
            (false, true) => self.start_date.clone(),
            (true, false) => self.end_date.clone(),
            (false, false) => format!("{} ~ {}", self.start_date, self.end_date),
        }
    }
}

/// Form buffer for a trip that has not been persisted yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TripDraft {
    pub name: String,
    pub location: String,
    pub start_date: String,
    pub end_date: String,
}

impl TripDraft {
    pub fn new(name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
            ..Self::default()
        }
    }
}
