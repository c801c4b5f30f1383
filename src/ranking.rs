//! Vote-ranked projection of a trip's suggestion cards.
//!
//! The view borrows the cards it was built from and never reorders or changes
//! the underlying slice. Rebuild it whenever a new snapshot arrives.

use serde::Serialize;

use crate::models::suggestion::{Category, Suggestion};

#[derive(Debug, Clone, Serialize)]
pub struct CategoryBucket<'a> {
    pub category: Category,
    pub cards: Vec<&'a Suggestion>,
}

impl CategoryBucket<'_> {
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RankedView<'a> {
    pub buckets: Vec<CategoryBucket<'a>>,
}

impl<'a> RankedView<'a> {
    /// Groups `cards` into the fixed category columns, most votes first.
    ///
    /// Cards with equal vote counts keep their relative input order.
    pub fn build(cards: &'a [Suggestion]) -> Self {
        let buckets = Category::ALL
            .into_iter()
            .map(|category| {
                let mut bucket: Vec<&Suggestion> = cards
                    .iter()
                    .filter(|card| card.category() == category)
                    .collect();
                // slice::sort_by is stable
                bucket.sort_by(|a, b| b.vote_count().cmp(&a.vote_count()));
                CategoryBucket {
                    category,
                    cards: bucket,
                }
            })
            .collect();
        Self { buckets }
    }

    pub fn bucket(&self, category: Category) -> &CategoryBucket<'a> {
        let index = Category::ALL
            .iter()
            .position(|candidate| *candidate == category)
            .unwrap_or_default();
        &self.buckets[index]
    }

    pub fn card_count(&self) -> usize {
        self.buckets.iter().map(|bucket| bucket.cards.len()).sum()
    }
}
