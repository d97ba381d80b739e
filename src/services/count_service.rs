//! Count reconciliation
//!
//! `Genre.bookCount` and `Series.bookCount` are denormalized. They are kept
//! close to the truth by per-document increments on every book write, and
//! repaired by a full recalculation sweep. Increments commute, so writes
//! interleaved from several clients only drift when a client dies between
//! writing a book and bumping its counters; the sweep fixes that.

use std::collections::HashMap;

use futures::future::try_join_all;
use serde_json::{Map, Value};

use super::records::fetch_all;
use crate::domain::{DomainError, StoreCollection, WriteBatch};
use crate::infrastructure::{AppContext, CacheKind};
use crate::models::{Book, Genre, Series};

pub const BOOK_COUNT_FIELD: &str = "bookCount";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountKind {
    Genres,
    Series,
}

impl CountKind {
    pub fn collection(&self) -> StoreCollection {
        match self {
            CountKind::Genres => StoreCollection::Genres,
            CountKind::Series => StoreCollection::Series,
        }
    }

    pub fn cache_kind(&self) -> CacheKind {
        match self {
            CountKind::Genres => CacheKind::Genres,
            CountKind::Series => CacheKind::Series,
        }
    }
}

/// Genre ids gained and lost by one book write
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenreDelta {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl GenreDelta {
    pub fn between(old: &[String], new: &[String]) -> Self {
        Self {
            added: new.iter().filter(|id| !old.contains(id)).cloned().collect(),
            removed: old.iter().filter(|id| !new.contains(id)).cloned().collect(),
        }
    }

    /// Every genre of a book entering the live set
    pub fn all_added(ids: &[String]) -> Self {
        Self::between(&[], ids)
    }

    /// Every genre of a book leaving the live set
    pub fn all_removed(ids: &[String]) -> Self {
        Self::between(ids, &[])
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Increment one counter. A counter document deleted in the meantime has
/// nothing left to count, so `NotFound` is skipped.
async fn bump(
    ctx: &AppContext,
    collection: StoreCollection,
    id: &str,
    delta: i64,
) -> Result<(), DomainError> {
    match ctx
        .store
        .increment(&ctx.user_id, collection, id, BOOK_COUNT_FIELD, delta)
        .await
    {
        Err(DomainError::NotFound) => {
            tracing::warn!("Skipping count update for missing {} {}", collection, id);
            Ok(())
        }
        other => other,
    }
}

/// One increment or decrement per affected genre
pub async fn apply_genre_delta(ctx: &AppContext, delta: &GenreDelta) -> Result<(), DomainError> {
    if delta.is_empty() {
        return Ok(());
    }

    let increments = delta.added.iter().map(|id| (id, 1));
    let decrements = delta.removed.iter().map(|id| (id, -1));
    try_join_all(
        increments
            .chain(decrements)
            .map(|(id, step)| bump(ctx, StoreCollection::Genres, id, step)),
    )
    .await?;

    tracing::debug!(
        "Genre counts updated: +{} -{}",
        delta.added.len(),
        delta.removed.len()
    );
    Ok(())
}

/// Move one book's membership from `old` to `new` series
pub async fn apply_series_change(
    ctx: &AppContext,
    old: Option<&str>,
    new: Option<&str>,
) -> Result<(), DomainError> {
    if old == new {
        return Ok(());
    }
    if let Some(old) = old {
        bump(ctx, StoreCollection::Series, old, -1).await?;
    }
    if let Some(new) = new {
        bump(ctx, StoreCollection::Series, new, 1).await?;
    }
    Ok(())
}

/// Counter updates for a book entering (`+1`) or leaving (`-1`) the live set
pub async fn apply_membership(ctx: &AppContext, book: &Book, entering: bool) -> Result<(), DomainError> {
    let series = book.series_id.as_deref();
    if entering {
        apply_genre_delta(ctx, &GenreDelta::all_added(&book.genres)).await?;
        apply_series_change(ctx, None, series).await
    } else {
        apply_genre_delta(ctx, &GenreDelta::all_removed(&book.genres)).await?;
        apply_series_change(ctx, series, None).await
    }
}

/// Outcome of a full recalculation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecalcReport {
    /// Live books scanned
    pub scanned: usize,
    /// Counter documents rewritten
    pub corrected: usize,
}

/// Membership tally over live books
pub fn tally(books: &[Book], kind: CountKind) -> HashMap<String, i64> {
    let mut counts: HashMap<String, i64> = HashMap::new();
    for book in books.iter().filter(|book| !book.is_deleted()) {
        match kind {
            CountKind::Genres => {
                let mut seen: Vec<&str> = Vec::new();
                for id in &book.genres {
                    if !seen.contains(&id.as_str()) {
                        seen.push(id);
                        *counts.entry(id.clone()).or_insert(0) += 1;
                    }
                }
            }
            CountKind::Series => {
                if let Some(id) = &book.series_id {
                    *counts.entry(id.clone()).or_insert(0) += 1;
                }
            }
        }
    }
    counts
}

/// Recount from every live book and rewrite only the counters that differ,
/// in one batch
pub async fn recalculate_counts(ctx: &AppContext, kind: CountKind) -> Result<RecalcReport, DomainError> {
    let books: Vec<Book> = fetch_all(ctx, StoreCollection::Books, None).await?;
    let scanned = books.iter().filter(|book| !book.is_deleted()).count();
    let counts = tally(&books, kind);

    let stored: Vec<(String, i64)> = match kind {
        CountKind::Genres => fetch_all::<Genre>(ctx, StoreCollection::Genres, None)
            .await?
            .into_iter()
            .map(|genre| (genre.id, genre.book_count))
            .collect(),
        CountKind::Series => fetch_all::<Series>(ctx, StoreCollection::Series, None)
            .await?
            .into_iter()
            .map(|series| (series.id, series.book_count))
            .collect(),
    };

    let mut batch = WriteBatch::new();
    for (id, current) in stored {
        let actual = counts.get(&id).copied().unwrap_or(0);
        if actual != current {
            tracing::debug!("{} {}: bookCount {} -> {}", kind.collection(), id, current, actual);
            let mut patch = Map::new();
            patch.insert(BOOK_COUNT_FIELD.to_string(), Value::from(actual));
            batch.update(kind.collection(), &id, patch);
        }
    }

    let corrected = batch.len();
    if corrected > 0 {
        ctx.store.commit(&ctx.user_id, batch).await?;
        ctx.cache.invalidate(&ctx.user_id, kind.cache_kind());
    }

    tracing::info!(
        "Recalculated {} counts: scanned {} books, corrected {}",
        kind.collection(),
        scanned,
        corrected
    );
    Ok(RecalcReport { scanned, corrected })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn delta_lists_only_changed_ids() {
        let delta = GenreDelta::between(&ids(&["g1", "g2"]), &ids(&["g2", "g3"]));
        assert_eq!(delta.added, ids(&["g3"]));
        assert_eq!(delta.removed, ids(&["g1"]));
        assert!(GenreDelta::between(&ids(&["g1"]), &ids(&["g1"])).is_empty());
    }

    #[test]
    fn tally_skips_deleted_books_and_repeated_ids() {
        let books = vec![
            Book {
                genres: ids(&["g1", "g1"]),
                series_id: Some("s1".into()),
                ..Default::default()
            },
            Book {
                genres: ids(&["g1", "g2"]),
                ..Default::default()
            },
            Book {
                genres: ids(&["g2"]),
                series_id: Some("s1".into()),
                deleted_at: Some(chrono::Utc::now()),
                ..Default::default()
            },
        ];

        let genres = tally(&books, CountKind::Genres);
        assert_eq!(genres.get("g1"), Some(&2));
        assert_eq!(genres.get("g2"), Some(&1));

        let series = tally(&books, CountKind::Series);
        assert_eq!(series.get("s1"), Some(&1));
    }
}
