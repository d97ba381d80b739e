//! Genre Service - create, rename, recolor, delete and merge genres

use serde_json::{Map, Value};

use super::count_service::BOOK_COUNT_FIELD;
use super::records::{Listing, decode_all, fetch_all, fetch_one};
use super::uniqueness::{ensure_color_available, ensure_unique_name, next_available_color};
use crate::domain::{DomainError, FieldFilter, OrderBy, StoreCollection, WriteBatch, encode};
use crate::infrastructure::{AppContext, CacheKind};
use crate::models::book::dedupe_ids;
use crate::models::{Book, Genre, GenrePatch};

/// All genres, from the local cache when possible
pub async fn list_genres(ctx: &AppContext) -> Listing<Genre> {
    let now = ctx.now();
    if let Some(entry) = ctx.cache.read_complete::<Genre>(&ctx.user_id, now) {
        tracing::debug!("Genres cache hit ({} records)", entry.records.len());
        return entry.into();
    }

    match fetch_all::<Genre>(ctx, StoreCollection::Genres, Some(OrderBy::asc("normalizedName"))).await {
        Ok(genres) => {
            ctx.cache.write(&ctx.user_id, genres.clone(), true, now);
            Listing::ok(genres, true)
        }
        Err(e) => {
            tracing::warn!("Failed to load genres: {}", e);
            Listing::failed(&e)
        }
    }
}

/// Genres read straight from the store, bypassing the cache, for uniqueness
/// checks right before a write
async fn fresh_genres(ctx: &AppContext) -> Result<Vec<Genre>, DomainError> {
    fetch_all(ctx, StoreCollection::Genres, None).await
}

/// Create a genre. Without an explicit color the first unused palette color
/// is assigned.
///
/// The name/color check and the insert are not isolated from other writers:
/// two clients creating the same name at the same moment can both succeed.
pub async fn create_genre(
    ctx: &AppContext,
    name: &str,
    color: Option<&str>,
) -> Result<Genre, DomainError> {
    let existing = fresh_genres(ctx).await?;
    let normalized_name = ensure_unique_name(name, &existing, None)?;
    let color = match color {
        Some(color) => ensure_color_available(color, &existing, None)?,
        None => next_available_color(&existing).to_string(),
    };

    let now = ctx.now();
    let mut genre = Genre {
        id: String::new(),
        name: name.trim().to_string(),
        normalized_name,
        color,
        book_count: 0,
        created_at: Some(now),
        updated_at: Some(now),
    };

    let doc = ctx
        .store
        .add(&ctx.user_id, StoreCollection::Genres, encode(&genre)?)
        .await?;
    genre.id = doc.id;

    ctx.cache.invalidate(&ctx.user_id, CacheKind::Genres);
    tracing::info!("Created genre {} ({})", genre.name, genre.id);
    Ok(genre)
}

/// Rename and/or recolor a genre; the same uniqueness rules apply, ignoring
/// the genre itself
pub async fn update_genre(ctx: &AppContext, id: &str, patch: GenrePatch) -> Result<Genre, DomainError> {
    let existing = fresh_genres(ctx).await?;
    let mut genre = existing
        .iter()
        .find(|genre| genre.id == id)
        .cloned()
        .ok_or(DomainError::NotFound)?;

    let mut fields = Map::new();
    if let Some(name) = &patch.name {
        genre.normalized_name = ensure_unique_name(name, &existing, Some(id))?;
        genre.name = name.trim().to_string();
        fields.insert("name".to_string(), Value::from(genre.name.clone()));
        fields.insert(
            "normalizedName".to_string(),
            Value::from(genre.normalized_name.clone()),
        );
    }
    if let Some(color) = &patch.color {
        genre.color = ensure_color_available(color, &existing, Some(id))?;
        fields.insert("color".to_string(), Value::from(genre.color.clone()));
    }
    if fields.is_empty() {
        return Ok(genre);
    }

    let now = ctx.now();
    genre.updated_at = Some(now);
    fields.insert("updatedAt".to_string(), serde_json::to_value(now)?);

    ctx.store
        .update(&ctx.user_id, StoreCollection::Genres, id, fields)
        .await?;
    ctx.cache.invalidate(&ctx.user_id, CacheKind::Genres);
    Ok(genre)
}

/// Books (live or soft-deleted) whose genre list contains `genre_id`
async fn books_with_genre(ctx: &AppContext, genre_id: &str) -> Result<Vec<Book>, DomainError> {
    let docs = ctx
        .store
        .find(
            &ctx.user_id,
            StoreCollection::Books,
            FieldFilter::contains("genres", genre_id),
            None,
        )
        .await?;
    decode_all(docs)
}

fn genres_patch(genres: Vec<String>, now: chrono::DateTime<chrono::Utc>) -> Result<Map<String, Value>, DomainError> {
    let mut patch = Map::new();
    patch.insert("genres".to_string(), serde_json::to_value(genres)?);
    patch.insert("updatedAt".to_string(), serde_json::to_value(now)?);
    Ok(patch)
}

/// Delete a genre and strip it from every book, in one atomic batch.
///
/// Returns the number of books touched; the books cache is invalidated only
/// when that is nonzero.
pub async fn delete_genre(ctx: &AppContext, id: &str) -> Result<usize, DomainError> {
    let _genre: Genre = fetch_one(ctx, StoreCollection::Genres, id).await?;
    let books = books_with_genre(ctx, id).await?;
    let now = ctx.now();

    let mut batch = WriteBatch::new();
    for book in &books {
        let remaining: Vec<String> = book.genres.iter().filter(|g| *g != id).cloned().collect();
        batch.update(StoreCollection::Books, &book.id, genres_patch(remaining, now)?);
    }
    batch.delete(StoreCollection::Genres, id);

    ctx.store.commit(&ctx.user_id, batch).await.inspect_err(|e| {
        tracing::error!("Failed to delete genre {}: {}", id, e);
    })?;

    ctx.cache.invalidate(&ctx.user_id, CacheKind::Genres);
    if !books.is_empty() {
        ctx.cache.invalidate(&ctx.user_id, CacheKind::Books);
    }

    tracing::info!("Deleted genre {}, updated {} books", id, books.len());
    Ok(books.len())
}

/// Fold `source_id` into `target_id`: every book referencing the source
/// references the target instead, the target count grows by the live books
/// that gained it, and the source is deleted. One atomic batch.
pub async fn merge_genres(ctx: &AppContext, source_id: &str, target_id: &str) -> Result<usize, DomainError> {
    if source_id == target_id {
        return Err(DomainError::field("target", "Cannot merge a genre into itself"));
    }
    let _source: Genre = fetch_one(ctx, StoreCollection::Genres, source_id).await?;
    let _target: Genre = fetch_one(ctx, StoreCollection::Genres, target_id).await?;

    let books = books_with_genre(ctx, source_id).await?;
    let now = ctx.now();

    let mut batch = WriteBatch::new();
    let mut gained = 0i64;
    for book in &books {
        if !book.is_deleted() && !book.genres.iter().any(|g| g == target_id) {
            gained += 1;
        }
        let replaced: Vec<String> = book
            .genres
            .iter()
            .map(|g| if g == source_id { target_id.to_string() } else { g.clone() })
            .collect();
        batch.update(StoreCollection::Books, &book.id, genres_patch(dedupe_ids(&replaced), now)?);
    }
    if gained != 0 {
        batch.increment(StoreCollection::Genres, target_id, BOOK_COUNT_FIELD, gained);
    }
    batch.delete(StoreCollection::Genres, source_id);

    ctx.store.commit(&ctx.user_id, batch).await?;

    ctx.cache.invalidate(&ctx.user_id, CacheKind::Genres);
    if !books.is_empty() {
        ctx.cache.invalidate(&ctx.user_id, CacheKind::Books);
    }

    tracing::info!(
        "Merged genre {} into {}: {} books updated",
        source_id,
        target_id,
        books.len()
    );
    Ok(books.len())
}
