//! Export Service - JSON backup and CSV spreadsheet of the library
//!
//! Exports read whole collections, so they only ever use complete listings.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::book_service::get_all_books;
use super::genre_service::list_genres;
use super::records::Listing;
use super::series_service::list_series;
use super::wishlist_service::list_wishlist;
use crate::domain::reading::{book_status, current_read, times_read};
use crate::domain::DomainError;
use crate::infrastructure::AppContext;
use crate::models::{Book, Genre, Series, WishlistItem};

pub const EXPORT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryBackup {
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    pub books: Vec<Book>,
    pub genres: Vec<Genre>,
    pub series: Vec<Series>,
    pub wishlist: Vec<WishlistItem>,
}

fn complete<T>(listing: Listing<T>, what: &str) -> Result<Vec<T>, DomainError> {
    if let Some(error) = listing.error {
        return Err(DomainError::Database(format!("Failed to load {}: {}", what, error)));
    }
    if !listing.is_complete {
        return Err(DomainError::Internal(format!("Incomplete {} listing", what)));
    }
    Ok(listing.records)
}

pub async fn build_backup(ctx: &AppContext) -> Result<LibraryBackup, DomainError> {
    Ok(LibraryBackup {
        version: EXPORT_FORMAT_VERSION,
        exported_at: ctx.now(),
        books: complete(get_all_books(ctx).await, "books")?,
        genres: complete(list_genres(ctx).await, "genres")?,
        series: complete(list_series(ctx).await, "series")?,
        wishlist: complete(list_wishlist(ctx).await, "wishlist")?,
    })
}

/// Versioned JSON backup of every collection
pub async fn export_json(ctx: &AppContext) -> Result<String, DomainError> {
    let backup = build_backup(ctx).await?;
    tracing::info!(
        "Exporting {} books, {} genres, {} series, {} wishlist items",
        backup.books.len(),
        backup.genres.len(),
        backup.series.len(),
        backup.wishlist.len()
    );
    Ok(serde_json::to_string_pretty(&backup)?)
}

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    #[serde(rename = "Title")]
    title: &'a str,
    #[serde(rename = "Author")]
    author: &'a str,
    #[serde(rename = "ISBN")]
    isbn: &'a str,
    #[serde(rename = "Genres")]
    genres: String,
    #[serde(rename = "Series")]
    series: &'a str,
    #[serde(rename = "Series Position")]
    series_position: Option<f64>,
    #[serde(rename = "Rating")]
    rating: Option<u8>,
    #[serde(rename = "Status")]
    status: &'a str,
    #[serde(rename = "Started")]
    started: String,
    #[serde(rename = "Finished")]
    finished: String,
    #[serde(rename = "Times Read")]
    times_read: usize,
}

fn date(value: Option<DateTime<Utc>>) -> String {
    value
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

/// Live books as CSV, genre and series ids resolved to names
pub async fn export_csv(ctx: &AppContext) -> Result<String, DomainError> {
    let books = complete(get_all_books(ctx).await, "books")?;
    let genres = complete(list_genres(ctx).await, "genres")?;
    let series = complete(list_series(ctx).await, "series")?;

    let genre_names: HashMap<&str, &str> = genres
        .iter()
        .map(|g| (g.id.as_str(), g.name.as_str()))
        .collect();
    let series_names: HashMap<&str, &str> = series
        .iter()
        .map(|s| (s.id.as_str(), s.name.as_str()))
        .collect();

    let mut writer = csv::Writer::from_writer(Vec::new());
    for book in &books {
        let read = current_read(book).unwrap_or_default();
        let row = CsvRow {
            title: &book.title,
            author: &book.author,
            isbn: book.isbn.as_deref().unwrap_or_default(),
            genres: book
                .genres
                .iter()
                .filter_map(|id| genre_names.get(id.as_str()).copied())
                .collect::<Vec<_>>()
                .join("; "),
            series: book
                .series_id
                .as_deref()
                .and_then(|id| series_names.get(id).copied())
                .unwrap_or_default(),
            series_position: book.series_position,
            rating: book.rating,
            status: book_status(book).map(|s| s.as_str()).unwrap_or_default(),
            started: date(read.started_at),
            finished: date(read.finished_at),
            times_read: times_read(book),
        };
        writer
            .serialize(row)
            .map_err(|e| DomainError::Internal(format!("CSV write error: {}", e)))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| DomainError::Internal(format!("CSV write error: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| DomainError::Internal(e.to_string()))
}
