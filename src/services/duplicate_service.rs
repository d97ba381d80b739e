//! Duplicate detection for books and wishlist entries
//!
//! Two tiers, first match wins:
//! 1. exact ISBN, as an indexed equality query;
//! 2. normalized title + author, compared client-side over the most recent
//!    `duplicate_scan_limit` records, since the store cannot compare
//!    case- or accent-insensitively. Older records are not checked.

use serde::Serialize;

use super::records::decode_all;
use crate::domain::{DomainError, FieldFilter, OrderBy, StoreCollection};
use crate::infrastructure::AppContext;
use crate::models::{Book, WishlistItem};
use crate::utils::{clean_isbn, normalize_text};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchType {
    Isbn,
    TitleAuthor,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DuplicateCheck {
    pub is_duplicate: bool,
    pub match_type: Option<MatchType>,
    pub existing_book: Option<Book>,
}

impl DuplicateCheck {
    pub fn none() -> Self {
        Self::default()
    }

    fn found(match_type: MatchType, book: Book) -> Self {
        Self {
            is_duplicate: true,
            match_type: Some(match_type),
            existing_book: Some(book),
        }
    }

    /// User-facing description of the conflicting record
    pub fn message(&self) -> Option<String> {
        let book = self.existing_book.as_ref()?;
        Some(describe(&book.title, &book.author, self.match_type, "your library"))
    }
}

fn describe(title: &str, author: &str, match_type: Option<MatchType>, place: &str) -> String {
    let by = if author.is_empty() {
        String::new()
    } else {
        format!(" by {}", author)
    };
    let reason = match match_type {
        Some(MatchType::Isbn) => "same ISBN",
        _ => "same title and author",
    };
    format!("\"{}\"{} is already in {} ({})", title, by, place, reason)
}

/// A user's explicit "add anyway" for one warning. It stops applying as soon
/// as the title, author or ISBN is edited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateOverride {
    isbn: String,
    title: String,
    author: String,
}

impl DuplicateOverride {
    pub fn acknowledge(isbn: Option<&str>, title: &str, author: &str) -> Self {
        Self {
            isbn: isbn_key(isbn),
            title: normalize_text(Some(title)),
            author: normalize_text(Some(author)),
        }
    }

    pub fn covers(&self, isbn: Option<&str>, title: &str, author: &str) -> bool {
        *self == Self::acknowledge(isbn, title, author)
    }
}

/// Comparable ISBN: separators stripped when it parses, trimmed raw text
/// otherwise
fn isbn_key(isbn: Option<&str>) -> String {
    match clean_isbn(isbn) {
        Ok(Some(cleaned)) => cleaned,
        Ok(None) => String::new(),
        Err(_) => isbn.unwrap_or_default().trim().to_string(),
    }
}

async fn book_by_isbn(ctx: &AppContext, isbn: &str) -> Result<Option<Book>, DomainError> {
    let docs = ctx
        .store
        .find(&ctx.user_id, StoreCollection::Books, FieldFilter::equals("isbn", isbn), None)
        .await?;
    Ok(decode_all::<Book>(docs)?
        .into_iter()
        .find(|book| !book.is_deleted()))
}

async fn wishlist_by_isbn(ctx: &AppContext, isbn: &str) -> Result<Option<WishlistItem>, DomainError> {
    let docs = ctx
        .store
        .find(&ctx.user_id, StoreCollection::Wishlist, FieldFilter::equals("isbn", isbn), Some(1))
        .await?;
    Ok(decode_all::<WishlistItem>(docs)?.into_iter().next())
}

/// Most recent records of a collection, bounded by the scan limit
async fn recent<T: serde::de::DeserializeOwned>(
    ctx: &AppContext,
    collection: StoreCollection,
) -> Result<Vec<T>, DomainError> {
    let docs = ctx
        .store
        .list(
            &ctx.user_id,
            collection,
            Some(OrderBy::desc("createdAt")),
            Some(ctx.config.duplicate_scan_limit),
        )
        .await?;
    decode_all(docs)
}

fn same_text(title: &str, author: &str, key_title: &str, key_author: &str) -> bool {
    normalize_text(Some(title)) == key_title && normalize_text(Some(author)) == key_author
}

/// Two-tier duplicate check of a candidate book against the library
pub async fn check_duplicate_book(
    ctx: &AppContext,
    isbn: Option<&str>,
    title: &str,
    author: &str,
) -> Result<DuplicateCheck, DomainError> {
    let isbn = isbn_key(isbn);
    if !isbn.is_empty()
        && let Some(book) = book_by_isbn(ctx, &isbn).await?
    {
        tracing::debug!("Duplicate by ISBN: {}", book.id);
        return Ok(DuplicateCheck::found(MatchType::Isbn, book));
    }

    let key_title = normalize_text(Some(title));
    if key_title.is_empty() {
        return Ok(DuplicateCheck::none());
    }
    let key_author = normalize_text(Some(author));

    let found = recent::<Book>(ctx, StoreCollection::Books)
        .await?
        .into_iter()
        .find(|book| !book.is_deleted() && same_text(&book.title, &book.author, &key_title, &key_author));

    Ok(match found {
        Some(book) => {
            tracing::debug!("Duplicate by title/author: {}", book.id);
            DuplicateCheck::found(MatchType::TitleAuthor, book)
        }
        None => DuplicateCheck::none(),
    })
}

/// Where a wishlist duplicate was found
#[derive(Debug, Clone, PartialEq)]
pub enum DuplicateMatch {
    Library(Book),
    Wishlist(WishlistItem),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WishlistDuplicateCheck {
    pub is_duplicate: bool,
    pub match_type: Option<MatchType>,
    pub existing: Option<DuplicateMatch>,
}

impl WishlistDuplicateCheck {
    fn found(match_type: MatchType, existing: DuplicateMatch) -> Self {
        Self {
            is_duplicate: true,
            match_type: Some(match_type),
            existing: Some(existing),
        }
    }

    pub fn message(&self) -> Option<String> {
        match self.existing.as_ref()? {
            DuplicateMatch::Library(book) => Some(describe(
                &book.title,
                &book.author,
                self.match_type,
                "your library",
            )),
            DuplicateMatch::Wishlist(item) => Some(describe(
                &item.title,
                &item.author,
                self.match_type,
                "your wishlist",
            )),
        }
    }
}

/// Two-tier check for a wishlist candidate. Each tier looks at the wishlist
/// first and then, when `include_library` is set, at the library.
pub async fn check_duplicate_wishlist(
    ctx: &AppContext,
    isbn: Option<&str>,
    title: &str,
    author: &str,
    include_library: bool,
) -> Result<WishlistDuplicateCheck, DomainError> {
    let isbn = isbn_key(isbn);
    if !isbn.is_empty() {
        if let Some(item) = wishlist_by_isbn(ctx, &isbn).await? {
            return Ok(WishlistDuplicateCheck::found(
                MatchType::Isbn,
                DuplicateMatch::Wishlist(item),
            ));
        }
        if include_library && let Some(book) = book_by_isbn(ctx, &isbn).await? {
            return Ok(WishlistDuplicateCheck::found(
                MatchType::Isbn,
                DuplicateMatch::Library(book),
            ));
        }
    }

    let key_title = normalize_text(Some(title));
    if key_title.is_empty() {
        return Ok(WishlistDuplicateCheck::default());
    }
    let key_author = normalize_text(Some(author));

    if let Some(item) = recent::<WishlistItem>(ctx, StoreCollection::Wishlist)
        .await?
        .into_iter()
        .find(|item| same_text(&item.title, &item.author, &key_title, &key_author))
    {
        return Ok(WishlistDuplicateCheck::found(
            MatchType::TitleAuthor,
            DuplicateMatch::Wishlist(item),
        ));
    }

    if include_library
        && let Some(book) = recent::<Book>(ctx, StoreCollection::Books)
            .await?
            .into_iter()
            .find(|book| {
                !book.is_deleted() && same_text(&book.title, &book.author, &key_title, &key_author)
            })
    {
        return Ok(WishlistDuplicateCheck::found(
            MatchType::TitleAuthor,
            DuplicateMatch::Library(book),
        ));
    }

    Ok(WishlistDuplicateCheck::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_survives_cosmetic_changes_only() {
        let ack = DuplicateOverride::acknowledge(Some("978-0-14-312755-0"), "Dune", "Frank Herbert");
        assert!(ack.covers(Some("9780143127550"), "  DUNE ", "frank  herbert"));
        assert!(!ack.covers(Some("9780143127550"), "Dune Messiah", "Frank Herbert"));
        assert!(!ack.covers(Some("9780143127550"), "Dune", "Brian Herbert"));
        assert!(!ack.covers(None, "Dune", "Frank Herbert"));
    }

    #[test]
    fn message_names_the_conflicting_book() {
        let check = DuplicateCheck::found(
            MatchType::Isbn,
            Book {
                title: "Dune".into(),
                author: "Frank Herbert".into(),
                ..Default::default()
            },
        );
        assert_eq!(
            check.message().unwrap(),
            "\"Dune\" by Frank Herbert is already in your library (same ISBN)"
        );
        assert!(DuplicateCheck::none().message().is_none());
    }
}
