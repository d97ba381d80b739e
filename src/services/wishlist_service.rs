//! Wishlist Service - wanted books, duplicate-checked against the wishlist
//! and the library, and promotion into the library

use serde_json::{Map, Value};

use super::book_service::{AddOutcome, add_book};
use super::duplicate_service::{DuplicateOverride, WishlistDuplicateCheck, check_duplicate_wishlist};
use super::records::{Listing, fetch_all, fetch_one};
use crate::domain::{DomainError, OrderBy, StoreCollection, encode};
use crate::infrastructure::{AppContext, CacheKind};
use crate::models::{NewBook, NewWishlistItem, Priority, WishlistItem};
use crate::utils::clean_isbn;

#[derive(Debug, Clone, PartialEq)]
pub enum WishlistAddOutcome {
    Added(WishlistItem),
    Duplicate(WishlistDuplicateCheck),
}

pub async fn list_wishlist(ctx: &AppContext) -> Listing<WishlistItem> {
    let now = ctx.now();
    if let Some(entry) = ctx.cache.read_complete::<WishlistItem>(&ctx.user_id, now) {
        return entry.into();
    }

    match fetch_all::<WishlistItem>(ctx, StoreCollection::Wishlist, Some(OrderBy::desc("createdAt"))).await {
        Ok(items) => {
            ctx.cache.write(&ctx.user_id, items.clone(), true, now);
            Listing::ok(items, true)
        }
        Err(e) => {
            tracing::warn!("Failed to load wishlist: {}", e);
            Listing::failed(&e)
        }
    }
}

pub async fn add_wishlist_item(
    ctx: &AppContext,
    item: NewWishlistItem,
    acknowledged: Option<&DuplicateOverride>,
) -> Result<WishlistAddOutcome, DomainError> {
    let title = item.title.trim().to_string();
    if title.is_empty() {
        return Err(DomainError::field("title", "Title is required"));
    }
    let author = item.author.trim().to_string();
    let isbn = clean_isbn(item.isbn.as_deref())?;

    let overridden = acknowledged.is_some_and(|ack| ack.covers(isbn.as_deref(), &title, &author));
    if !overridden {
        let check = check_duplicate_wishlist(ctx, isbn.as_deref(), &title, &author, true).await?;
        if check.is_duplicate {
            return Ok(WishlistAddOutcome::Duplicate(check));
        }
    }

    let mut wished = WishlistItem {
        id: String::new(),
        title,
        author,
        isbn,
        priority: item.priority,
        added_from: item.added_from,
        cover_image_url: item.cover_image_url.filter(|url| !url.trim().is_empty()),
        notes: item.notes.filter(|notes| !notes.trim().is_empty()),
        created_at: Some(ctx.now()),
    };

    let doc = ctx
        .store
        .add(&ctx.user_id, StoreCollection::Wishlist, encode(&wished)?)
        .await?;
    wished.id = doc.id;

    ctx.cache.invalidate(&ctx.user_id, CacheKind::Wishlist);
    tracing::info!("Added {} to wishlist ({})", wished.title, wished.id);
    Ok(WishlistAddOutcome::Added(wished))
}

/// Set or clear (`None`) the priority of an item
pub async fn update_wishlist_priority(
    ctx: &AppContext,
    id: &str,
    priority: Option<Priority>,
) -> Result<WishlistItem, DomainError> {
    let mut item: WishlistItem = fetch_one(ctx, StoreCollection::Wishlist, id).await?;

    let mut fields = Map::new();
    fields.insert(
        "priority".to_string(),
        priority.map_or(Ok(Value::Null), serde_json::to_value)?,
    );
    ctx.store
        .update(&ctx.user_id, StoreCollection::Wishlist, id, fields)
        .await?;

    item.priority = priority;
    ctx.cache.invalidate(&ctx.user_id, CacheKind::Wishlist);
    Ok(item)
}

pub async fn delete_wishlist_item(ctx: &AppContext, id: &str) -> Result<(), DomainError> {
    ctx.store
        .delete(&ctx.user_id, StoreCollection::Wishlist, id)
        .await?;
    ctx.cache.invalidate(&ctx.user_id, CacheKind::Wishlist);
    tracing::info!("Removed wishlist item {}", id);
    Ok(())
}

/// Add a wishlist item to the library and drop it from the wishlist.
///
/// The library add runs the regular duplicate check. On a duplicate nothing
/// is written and the item stays; the caller can retry with an override.
pub async fn move_to_library(
    ctx: &AppContext,
    id: &str,
    acknowledged: Option<&DuplicateOverride>,
) -> Result<AddOutcome, DomainError> {
    let item: WishlistItem = fetch_one(ctx, StoreCollection::Wishlist, id).await?;
    let new_book = NewBook {
        title: item.title,
        author: item.author,
        isbn: item.isbn,
        cover_image_url: item.cover_image_url,
        notes: item.notes,
        ..Default::default()
    };

    let outcome = add_book(ctx, new_book, acknowledged).await?;
    if let AddOutcome::Added(book) = &outcome {
        delete_wishlist_item(ctx, id).await?;
        tracing::info!("Moved wishlist item {} to library as {}", id, book.id);
    }
    Ok(outcome)
}
