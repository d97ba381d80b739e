//! Book Service - listing, add/edit flows, trash and reading history
//!
//! Every write follows the same order: write the book document, then apply
//! counter increments, then invalidate caches. A failure stops the sequence,
//! so caches are only invalidated once all remote writes went through.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use super::count_service::{GenreDelta, apply_genre_delta, apply_membership, apply_series_change};
use super::duplicate_service::{DuplicateCheck, DuplicateOverride, check_duplicate_book};
use super::records::{Listing, decode_all, fetch_all, fetch_one};
use crate::domain::reading::{self, migrate_reads};
use crate::domain::{DomainError, FormValidator, OrderBy, RawFields, StoreCollection, WriteBatch, encode};
use crate::infrastructure::{AppContext, CacheKind};
use crate::models::book::dedupe_ids;
use crate::models::{Book, BookPatch, NewBook, ReadInterval};
use crate::utils::clean_isbn;

const MAX_RATING: u8 = 5;

#[derive(Debug, Clone, Copy, Default)]
pub struct GetBooksOptions {
    /// Skip the local cache and refetch the first page
    pub force_refresh: bool,
}

/// Result of an add attempt
#[derive(Debug, Clone, PartialEq)]
pub enum AddOutcome {
    Added(Book),
    /// Nothing was written; the caller may retry with a [`DuplicateOverride`]
    Duplicate(DuplicateCheck),
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, DomainError> {
    Ok(serde_json::to_value(value)?)
}

fn live_books(books: Vec<Book>) -> Vec<Book> {
    books
        .into_iter()
        .filter(|book| !book.is_deleted())
        .map(migrate_reads)
        .collect()
}

/// First page of live books, newest first. Served from the cache (complete
/// or not) unless `force_refresh` is set.
pub async fn get_books(ctx: &AppContext, options: GetBooksOptions) -> Listing<Book> {
    let now = ctx.now();
    if !options.force_refresh
        && let Some(entry) = ctx.cache.read::<Book>(&ctx.user_id, now)
    {
        return entry.into();
    }

    let limit = ctx.config.books_page_size;
    let result = ctx
        .store
        .list(
            &ctx.user_id,
            StoreCollection::Books,
            Some(OrderBy::desc("createdAt")),
            Some(limit),
        )
        .await;

    let docs = match result {
        Ok(docs) => docs,
        Err(e) => {
            tracing::warn!("Failed to load books: {}", e);
            return Listing::failed(&e);
        }
    };

    // A short page means the whole collection was read
    let is_complete = (docs.len() as u64) < limit;
    match decode_all::<Book>(docs) {
        Ok(books) => {
            let books = live_books(books);
            ctx.cache.write(&ctx.user_id, books.clone(), is_complete, now);
            Listing::ok(books, is_complete)
        }
        Err(e) => {
            tracing::warn!("Failed to decode books: {}", e);
            Listing::failed(&e)
        }
    }
}

/// Every live book. Never answered from a partial cache entry.
pub async fn get_all_books(ctx: &AppContext) -> Listing<Book> {
    let now = ctx.now();
    if let Some(entry) = ctx.cache.read_complete::<Book>(&ctx.user_id, now) {
        return entry.into();
    }

    match fetch_all::<Book>(ctx, StoreCollection::Books, Some(OrderBy::desc("createdAt"))).await {
        Ok(books) => {
            let books = live_books(books);
            ctx.cache.write(&ctx.user_id, books.clone(), true, now);
            Listing::ok(books, true)
        }
        Err(e) => {
            tracing::warn!("Failed to load all books: {}", e);
            Listing::failed(&e)
        }
    }
}

/// One book, reading history migrated
pub async fn get_book(ctx: &AppContext, id: &str) -> Result<Book, DomainError> {
    let book: Book = fetch_one(ctx, StoreCollection::Books, id).await?;
    Ok(migrate_reads(book))
}

fn validate_rating(rating: Option<u8>) -> Result<(), DomainError> {
    match rating {
        Some(r) if r > MAX_RATING => Err(DomainError::field(
            "rating",
            format!("Rating must be between 0 and {}", MAX_RATING),
        )),
        _ => Ok(()),
    }
}

fn required_title(title: &str) -> Result<&str, DomainError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(DomainError::field("title", "Title is required"));
    }
    Ok(title)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Invalidate the books cache plus the counter caches a book touches
fn invalidate_for(ctx: &AppContext, genres: bool, series: bool) {
    ctx.cache.invalidate(&ctx.user_id, CacheKind::Books);
    if genres {
        ctx.cache.invalidate(&ctx.user_id, CacheKind::Genres);
    }
    if series {
        ctx.cache.invalidate(&ctx.user_id, CacheKind::Series);
    }
}

/// Add a book: duplicate check, book write, counter increments, cache
/// invalidation, in that order.
///
/// `acknowledged` skips the duplicate check only while title, author and
/// ISBN still match what the user confirmed.
pub async fn add_book(
    ctx: &AppContext,
    new_book: NewBook,
    acknowledged: Option<&DuplicateOverride>,
) -> Result<AddOutcome, DomainError> {
    let title = required_title(&new_book.title)?.to_string();
    let author = new_book.author.trim().to_string();
    let isbn = clean_isbn(new_book.isbn.as_deref())?;
    validate_rating(new_book.rating)?;
    reading::validate_history(&new_book.reads)?;

    let overridden = acknowledged.is_some_and(|ack| ack.covers(isbn.as_deref(), &title, &author));
    if !overridden {
        let check = check_duplicate_book(ctx, isbn.as_deref(), &title, &author).await?;
        if check.is_duplicate {
            tracing::info!("Add blocked by duplicate check: {}", title);
            return Ok(AddOutcome::Duplicate(check));
        }
    }

    let now = ctx.now();
    let series_id = non_blank(new_book.series_id);
    let mut book = Book {
        title,
        author,
        isbn,
        genres: dedupe_ids(&new_book.genres),
        series_position: series_id.as_ref().and(new_book.series_position),
        series_id,
        rating: new_book.rating,
        cover_image_url: non_blank(new_book.cover_image_url),
        publisher: non_blank(new_book.publisher),
        published_date: non_blank(new_book.published_date),
        page_count: new_book.page_count,
        notes: non_blank(new_book.notes),
        reads: Some(new_book.reads),
        created_at: Some(now),
        updated_at: Some(now),
        ..Default::default()
    };

    let doc = ctx
        .store
        .add(&ctx.user_id, StoreCollection::Books, encode(&book)?)
        .await
        .inspect_err(|e| tracing::error!("Failed to add book: {}", e))?;
    book.id = doc.id;

    apply_membership(ctx, &book, true).await?;
    invalidate_for(ctx, !book.genres.is_empty(), book.series_id.is_some());

    tracing::info!("Added book {} ({})", book.title, book.id);
    Ok(AddOutcome::Added(book))
}

/// Add flow driven by raw form input, validated by the `"book"` schema
pub async fn add_book_from_form(
    ctx: &AppContext,
    validator: &dyn FormValidator,
    raw: &RawFields,
    acknowledged: Option<&DuplicateOverride>,
) -> Result<AddOutcome, DomainError> {
    let data = validator.validate("book", raw).map_err(DomainError::Validation)?;
    let new_book: NewBook =
        serde_json::from_value(data).map_err(|e| DomainError::field("form", e.to_string()))?;
    add_book(ctx, new_book, acknowledged).await
}

/// Edit a book, then move its genre and series counters to match.
///
/// Books in the trash are not counted anywhere, so editing them touches no
/// counters.
pub async fn update_book(ctx: &AppContext, id: &str, patch: BookPatch) -> Result<Book, DomainError> {
    let mut book = get_book(ctx, id).await?;
    let old_genres = book.genres.clone();
    let old_series = book.series_id.clone();
    let mut fields = Map::new();

    if let Some(title) = patch.title {
        book.title = required_title(&title)?.to_string();
        fields.insert("title".to_string(), Value::from(book.title.clone()));
    }
    if let Some(author) = patch.author {
        book.author = author.trim().to_string();
        fields.insert("author".to_string(), Value::from(book.author.clone()));
    }
    if let Some(isbn) = patch.isbn {
        book.isbn = clean_isbn(isbn.as_deref())?;
        fields.insert("isbn".to_string(), to_json(&book.isbn)?);
    }
    if let Some(genres) = patch.genres {
        book.genres = dedupe_ids(&genres);
        fields.insert("genres".to_string(), to_json(&book.genres)?);
    }
    if let Some(series_id) = patch.series_id {
        book.series_id = non_blank(series_id);
        fields.insert("seriesId".to_string(), to_json(&book.series_id)?);
        if book.series_id.is_none() {
            book.series_position = None;
            fields.insert("seriesPosition".to_string(), Value::Null);
        }
    }
    if let Some(position) = patch.series_position
        && book.series_id.is_some()
    {
        book.series_position = position;
        fields.insert("seriesPosition".to_string(), to_json(&position)?);
    }
    if let Some(rating) = patch.rating {
        validate_rating(rating)?;
        book.rating = rating;
        fields.insert("rating".to_string(), to_json(&rating)?);
    }
    if let Some(cover) = patch.cover_image_url {
        book.cover_image_url = non_blank(cover);
        fields.insert("coverImageUrl".to_string(), to_json(&book.cover_image_url)?);
    }
    if let Some(notes) = patch.notes {
        book.notes = non_blank(notes);
        fields.insert("notes".to_string(), to_json(&book.notes)?);
    }
    if fields.is_empty() {
        return Ok(book);
    }

    let now = ctx.now();
    book.updated_at = Some(now);
    fields.insert("updatedAt".to_string(), to_json(&now)?);
    ctx.store
        .update(&ctx.user_id, StoreCollection::Books, id, fields)
        .await?;

    let delta = GenreDelta::between(&old_genres, &book.genres);
    let series_changed = old_series != book.series_id;
    if !book.is_deleted() {
        apply_genre_delta(ctx, &delta).await?;
        apply_series_change(ctx, old_series.as_deref(), book.series_id.as_deref()).await?;
    }

    invalidate_for(ctx, !delta.is_empty(), series_changed);
    tracing::info!("Updated book {}", id);
    Ok(book)
}

/// Move a book to the trash; its genres and series stop counting it
pub async fn soft_delete_book(ctx: &AppContext, id: &str) -> Result<Book, DomainError> {
    let mut book = get_book(ctx, id).await?;
    if book.is_deleted() {
        return Ok(book);
    }

    let now = ctx.now();
    let mut fields = Map::new();
    fields.insert("deletedAt".to_string(), to_json(&now)?);
    fields.insert("updatedAt".to_string(), to_json(&now)?);
    ctx.store
        .update(&ctx.user_id, StoreCollection::Books, id, fields)
        .await?;
    book.deleted_at = Some(now);
    book.updated_at = Some(now);

    apply_membership(ctx, &book, false).await?;
    invalidate_for(ctx, !book.genres.is_empty(), book.series_id.is_some());

    tracing::info!("Moved book {} to trash", id);
    Ok(book)
}

/// Take a book out of the trash; its genres and series count it again
pub async fn restore_book(ctx: &AppContext, id: &str) -> Result<Book, DomainError> {
    let mut book = get_book(ctx, id).await?;
    if !book.is_deleted() {
        return Ok(book);
    }

    let now = ctx.now();
    let mut fields = Map::new();
    fields.insert("deletedAt".to_string(), Value::Null);
    fields.insert("updatedAt".to_string(), to_json(&now)?);
    ctx.store
        .update(&ctx.user_id, StoreCollection::Books, id, fields)
        .await?;
    book.deleted_at = None;
    book.updated_at = Some(now);

    apply_membership(ctx, &book, true).await?;
    invalidate_for(ctx, !book.genres.is_empty(), book.series_id.is_some());

    tracing::info!("Restored book {}", id);
    Ok(book)
}

/// Delete a book for good. A live book is uncounted first.
pub async fn purge_book(ctx: &AppContext, id: &str) -> Result<(), DomainError> {
    let book = get_book(ctx, id).await?;
    ctx.store
        .delete(&ctx.user_id, StoreCollection::Books, id)
        .await?;

    let was_live = !book.is_deleted();
    if was_live {
        apply_membership(ctx, &book, false).await?;
    }
    invalidate_for(
        ctx,
        was_live && !book.genres.is_empty(),
        was_live && book.series_id.is_some(),
    );

    tracing::info!("Purged book {}", id);
    Ok(())
}

/// Hard-delete every book that has been in the trash longer than the
/// retention window, in one batch. Returns how many were purged.
pub async fn purge_expired_books(ctx: &AppContext, now: DateTime<Utc>) -> Result<usize, DomainError> {
    let cutoff = now - Duration::days(ctx.config.trash_retention_days);
    let books: Vec<Book> = fetch_all(ctx, StoreCollection::Books, None).await?;

    let mut batch = WriteBatch::new();
    for book in &books {
        if let Some(deleted_at) = book.deleted_at
            && deleted_at < cutoff
        {
            batch.delete(StoreCollection::Books, &book.id);
        }
    }

    let purged = batch.len();
    if purged > 0 {
        ctx.store.commit(&ctx.user_id, batch).await?;
    }
    tracing::info!("Purged {} expired books from trash", purged);
    Ok(purged)
}

/// Books in the trash, most recently deleted first
pub async fn list_deleted_books(ctx: &AppContext) -> Listing<Book> {
    match fetch_all::<Book>(ctx, StoreCollection::Books, Some(OrderBy::desc("deletedAt"))).await {
        Ok(books) => {
            let deleted = books
                .into_iter()
                .filter(Book::is_deleted)
                .map(migrate_reads)
                .collect();
            Listing::ok(deleted, true)
        }
        Err(e) => {
            tracing::warn!("Failed to load trash: {}", e);
            Listing::failed(&e)
        }
    }
}

/// Persist a new reading history, dropping the legacy date fields
async fn write_reads(ctx: &AppContext, mut book: Book, reads: Vec<ReadInterval>) -> Result<Book, DomainError> {
    let now = ctx.now();
    let mut fields = Map::new();
    fields.insert("reads".to_string(), to_json(&reads)?);
    fields.insert("startedAt".to_string(), Value::Null);
    fields.insert("finishedAt".to_string(), Value::Null);
    fields.insert("status".to_string(), Value::Null);
    fields.insert("updatedAt".to_string(), to_json(&now)?);

    ctx.store
        .update(&ctx.user_id, StoreCollection::Books, &book.id, fields)
        .await?;
    ctx.cache.invalidate(&ctx.user_id, CacheKind::Books);

    book.reads = Some(reads);
    book.updated_at = Some(now);
    Ok(book)
}

fn reads_of(book: &Book) -> &[ReadInterval] {
    book.reads.as_deref().unwrap_or_default()
}

/// Start another read; refused while the current one is still open
pub async fn start_reread(ctx: &AppContext, id: &str, now: DateTime<Utc>) -> Result<Book, DomainError> {
    let book = get_book(ctx, id).await?;
    let reads = reading::start_reread(reads_of(&book), now)?;
    tracing::info!("Started read #{} of book {}", reads.len(), id);
    write_reads(ctx, book, reads).await
}

/// Edit the dates of the current read only
pub async fn set_current_read_dates(
    ctx: &AppContext,
    id: &str,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
) -> Result<Book, DomainError> {
    let book = get_book(ctx, id).await?;
    let reads = reading::set_current_dates(reads_of(&book), started_at, finished_at)?;
    write_reads(ctx, book, reads).await
}

pub async fn mark_finished(ctx: &AppContext, id: &str, now: DateTime<Utc>) -> Result<Book, DomainError> {
    let book = get_book(ctx, id).await?;
    let reads = reading::finish_current(reads_of(&book), now)?;
    write_reads(ctx, book, reads).await
}
