//! Series Service - series documents, membership cascades and expected books

use serde_json::{Map, Value};

use super::count_service::BOOK_COUNT_FIELD;
use super::records::{Listing, decode_all, fetch_all, fetch_one};
use crate::domain::{DomainError, FieldFilter, OrderBy, StoreCollection, WriteBatch, encode};
use crate::infrastructure::{AppContext, CacheKind};
use crate::models::{Book, ExpectedBook, Series, SeriesPatch};
use crate::utils::{clean_isbn, normalize_text};

pub async fn list_series(ctx: &AppContext) -> Listing<Series> {
    let now = ctx.now();
    if let Some(entry) = ctx.cache.read_complete::<Series>(&ctx.user_id, now) {
        return entry.into();
    }

    match fetch_all::<Series>(ctx, StoreCollection::Series, Some(OrderBy::asc("name"))).await {
        Ok(series) => {
            ctx.cache.write(&ctx.user_id, series.clone(), true, now);
            Listing::ok(series, true)
        }
        Err(e) => {
            tracing::warn!("Failed to load series: {}", e);
            Listing::failed(&e)
        }
    }
}

fn clean_expected(books: Vec<ExpectedBook>) -> Result<Vec<ExpectedBook>, DomainError> {
    books
        .into_iter()
        .filter(|book| !book.title.trim().is_empty())
        .map(|mut book| {
            book.title = book.title.trim().to_string();
            book.isbn = clean_isbn(book.isbn.as_deref())?;
            Ok(book)
        })
        .collect()
}

pub async fn create_series(
    ctx: &AppContext,
    name: &str,
    expected_books: Vec<ExpectedBook>,
) -> Result<Series, DomainError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DomainError::field("name", "Series name is required"));
    }

    let now = ctx.now();
    let mut series = Series {
        name: name.to_string(),
        expected_books: clean_expected(expected_books)?,
        created_at: Some(now),
        updated_at: Some(now),
        ..Default::default()
    };

    let doc = ctx
        .store
        .add(&ctx.user_id, StoreCollection::Series, encode(&series)?)
        .await?;
    series.id = doc.id;

    ctx.cache.invalidate(&ctx.user_id, CacheKind::Series);
    tracing::info!("Created series {} ({})", series.name, series.id);
    Ok(series)
}

pub async fn update_series(ctx: &AppContext, id: &str, patch: SeriesPatch) -> Result<Series, DomainError> {
    let mut series: Series = fetch_one(ctx, StoreCollection::Series, id).await?;
    let mut fields = Map::new();

    if let Some(name) = patch.name {
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::field("name", "Series name is required"));
        }
        series.name = name.to_string();
        fields.insert("name".to_string(), Value::from(name));
    }
    if let Some(description) = patch.description {
        fields.insert(
            "description".to_string(),
            description.clone().map_or(Value::Null, Value::from),
        );
        series.description = description;
    }
    if let Some(expected) = patch.expected_books {
        series.expected_books = clean_expected(expected)?;
        fields.insert(
            "expectedBooks".to_string(),
            serde_json::to_value(&series.expected_books)?,
        );
    }
    if fields.is_empty() {
        return Ok(series);
    }

    let now = ctx.now();
    series.updated_at = Some(now);
    fields.insert("updatedAt".to_string(), serde_json::to_value(now)?);
    ctx.store
        .update(&ctx.user_id, StoreCollection::Series, id, fields)
        .await?;

    ctx.cache.invalidate(&ctx.user_id, CacheKind::Series);
    Ok(series)
}

async fn books_in_series(ctx: &AppContext, series_id: &str) -> Result<Vec<Book>, DomainError> {
    let docs = ctx
        .store
        .find(
            &ctx.user_id,
            StoreCollection::Books,
            FieldFilter::equals("seriesId", series_id),
            None,
        )
        .await?;
    decode_all(docs)
}

/// Delete a series and detach its books (series id and position cleared) in
/// one batch. Returns the number of books touched.
pub async fn delete_series(ctx: &AppContext, id: &str) -> Result<usize, DomainError> {
    let _series: Series = fetch_one(ctx, StoreCollection::Series, id).await?;
    let books = books_in_series(ctx, id).await?;
    let now = serde_json::to_value(ctx.now())?;

    let mut batch = WriteBatch::new();
    for book in &books {
        let mut patch = Map::new();
        patch.insert("seriesId".to_string(), Value::Null);
        patch.insert("seriesPosition".to_string(), Value::Null);
        patch.insert("updatedAt".to_string(), now.clone());
        batch.update(StoreCollection::Books, &book.id, patch);
    }
    batch.delete(StoreCollection::Series, id);

    ctx.store.commit(&ctx.user_id, batch).await.inspect_err(|e| {
        tracing::error!("Failed to delete series {}: {}", id, e);
    })?;

    ctx.cache.invalidate(&ctx.user_id, CacheKind::Series);
    if !books.is_empty() {
        ctx.cache.invalidate(&ctx.user_id, CacheKind::Books);
    }
    tracing::info!("Deleted series {}, detached {} books", id, books.len());
    Ok(books.len())
}

/// Move every book of `source_id` into `target_id` and delete the source.
/// Expected books of the source not already listed on the target are
/// carried over.
pub async fn merge_series(ctx: &AppContext, source_id: &str, target_id: &str) -> Result<usize, DomainError> {
    if source_id == target_id {
        return Err(DomainError::field("target", "Cannot merge a series into itself"));
    }
    let source: Series = fetch_one(ctx, StoreCollection::Series, source_id).await?;
    let target: Series = fetch_one(ctx, StoreCollection::Series, target_id).await?;
    let books = books_in_series(ctx, source_id).await?;
    let now = serde_json::to_value(ctx.now())?;

    let mut batch = WriteBatch::new();
    for book in &books {
        let mut patch = Map::new();
        patch.insert("seriesId".to_string(), Value::from(target_id));
        patch.insert("updatedAt".to_string(), now.clone());
        batch.update(StoreCollection::Books, &book.id, patch);
    }

    let moved_live = books.iter().filter(|book| !book.is_deleted()).count() as i64;
    if moved_live != 0 {
        batch.increment(StoreCollection::Series, target_id, BOOK_COUNT_FIELD, moved_live);
    }

    let mut expected = target.expected_books.clone();
    for candidate in source.expected_books {
        let key = normalize_text(Some(&candidate.title));
        if !expected
            .iter()
            .any(|e| normalize_text(Some(&e.title)) == key)
        {
            expected.push(candidate);
        }
    }
    if expected.len() != target.expected_books.len() {
        let mut patch = Map::new();
        patch.insert("expectedBooks".to_string(), serde_json::to_value(&expected)?);
        batch.update(StoreCollection::Series, target_id, patch);
    }
    batch.delete(StoreCollection::Series, source_id);

    ctx.store.commit(&ctx.user_id, batch).await?;

    ctx.cache.invalidate(&ctx.user_id, CacheKind::Series);
    if !books.is_empty() {
        ctx.cache.invalidate(&ctx.user_id, CacheKind::Books);
    }
    tracing::info!(
        "Merged series {} into {}: {} books moved",
        source_id,
        target_id,
        books.len()
    );
    Ok(books.len())
}

/// Expected books not matched by an owned, live book of the series (by ISBN
/// or normalized title)
pub fn missing_expected_books(series: &Series, owned: &[Book]) -> Vec<ExpectedBook> {
    let members: Vec<&Book> = owned
        .iter()
        .filter(|book| !book.is_deleted() && book.series_id.as_deref() == Some(series.id.as_str()))
        .collect();

    series
        .expected_books
        .iter()
        .filter(|expected| {
            let title = normalize_text(Some(&expected.title));
            !members.iter().any(|book| {
                let same_isbn = expected.isbn.is_some() && expected.isbn == book.isbn;
                same_isbn || normalize_text(Some(&book.title)) == title
            })
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExpectedBookSource;

    fn expected(title: &str, isbn: Option<&str>) -> ExpectedBook {
        ExpectedBook {
            title: title.to_string(),
            isbn: isbn.map(str::to_string),
            position: None,
            source: ExpectedBookSource::Api,
        }
    }

    #[test]
    fn missing_expected_books_matches_by_isbn_or_title() {
        let series = Series {
            id: "s1".into(),
            name: "Dune".into(),
            expected_books: vec![
                expected("Dune", Some("9780441013593")),
                expected("Dune Messiah", None),
                expected("Children of Dune", None),
            ],
            ..Default::default()
        };
        let owned = vec![
            Book {
                title: "DUNE (40th anniversary)".into(),
                isbn: Some("9780441013593".into()),
                series_id: Some("s1".into()),
                ..Default::default()
            },
            Book {
                title: "Dune messiah".into(),
                series_id: Some("s1".into()),
                ..Default::default()
            },
            Book {
                title: "Children of Dune".into(),
                series_id: Some("other".into()),
                ..Default::default()
            },
        ];

        let missing = missing_expected_books(&series, &owned);
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].title, "Children of Dune");
    }
}
