use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use url::Url;

/// Number of voters shown by name on a card before collapsing into `+N`.
pub const LEADING_VOTERS: usize = 3;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Category {
    #[default]
    Lodging,
    Food,
    Transport,
    Sights,
}

impl Category {
    /// Display order of the board columns.
    pub const ALL: [Category; 4] = [
        Category::Lodging,
        Category::Food,
        Category::Transport,
        Category::Sights,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Lodging => "lodging",
            Category::Food => "food",
            Category::Transport => "transport",
            Category::Sights => "sights",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Category::Lodging => "Lodging",
            Category::Food => "Food",
            Category::Transport => "Transport",
            Category::Sights => "Sights",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown category `{0}`")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|category| category.as_str() == s)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

/// The editable part of a suggestion card.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestionFields {
    pub category: Category,
    pub title: String,
    pub location: String,
    pub description: String,
    /// Empty, a remote URL, or an inlined `data:` image.
    pub image: String,
    pub link: String,
}

impl SuggestionFields {
    pub fn titled(category: Category, title: impl Into<String>) -> Self {
        Self {
            category,
            title: title.into(),
            ..Self::default()
        }
    }

    /// The link is either left empty or an `http`/`https` address.
    pub fn link_is_acceptable(&self) -> bool {
        let link = self.link.trim();
        link.is_empty() || web_url(link).is_some()
    }
}

fn web_url(raw: &str) -> Option<Url> {
    Url::parse(raw)
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Empty,
    Remote,
    Inline,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub id: String,
    pub trip_id: String,
    #[serde(flatten)]
    pub fields: SuggestionFields,
    /// Voter names in the order the votes arrived.
    pub votes: Vec<String>,
}

impl Suggestion {
    pub fn vote_count(&self) -> usize {
        self.votes.len()
    }

    pub fn has_voted(&self, voter: &str) -> bool {
        self.votes.iter().any(|existing| existing == voter)
    }

    pub fn category(&self) -> Category {
        self.fields.category
    }

    pub fn title(&self) -> &str {
        &self.fields.title
    }

    pub fn image_kind(&self) -> ImageKind {
        let image = self.fields.image.trim();
        if image.is_empty() {
            return ImageKind::Empty;
        }
        match Url::parse(image) {
            Ok(url) if url.scheme() == "data" => ImageKind::Inline,
            _ => ImageKind::Remote,
        }
    }

    /// Image to render, falling back to `placeholder` when none was given.
    pub fn image_src<'a>(&'a self, placeholder: &'a str) -> &'a str {
        match self.image_kind() {
            ImageKind::Empty => placeholder,
            ImageKind::Remote | ImageKind::Inline => self.fields.image.trim(),
        }
    }

    /// The external link when it is safe to render as an anchor.
    pub fn web_link(&self) -> Option<&str> {
        let link = self.fields.link.trim();
        web_url(link).map(|_| link)
    }

    pub fn voter_initials(&self) -> Vec<String> {
        self.votes
            .iter()
            .take(LEADING_VOTERS)
            .map(|voter| voter.chars().next().map(String::from).unwrap_or_default())
            .collect()
    }

    pub fn hidden_voter_count(&self) -> usize {
        self.votes.len().saturating_sub(LEADING_VOTERS)
    }
}
