//! Metadata Service - bounded calls to the lookup provider and mapping of
//! provider data onto the user's library

use std::time::Duration;

use tokio::time::timeout;

use crate::domain::{BookMetadata, MetadataProvider, SearchPage};
use crate::models::{Genre, NewBook};
use crate::utils::{normalize_genre_name, normalize_text};

/// ISBN lookup bounded by `limit`. A timeout or provider error means "no
/// data", never a failure of the surrounding flow.
pub async fn lookup_with_timeout(
    provider: &dyn MetadataProvider,
    isbn: &str,
    limit: Duration,
) -> Option<BookMetadata> {
    match timeout(limit, provider.lookup_isbn(isbn)).await {
        Ok(Ok(found)) => found,
        Ok(Err(e)) => {
            tracing::warn!("Metadata lookup for {} failed: {}", isbn, e);
            None
        }
        Err(_) => {
            tracing::warn!("Metadata lookup for {} timed out after {:?}", isbn, limit);
            None
        }
    }
}

/// Free-text search bounded by `limit`; an empty page on timeout or error
pub async fn search_with_timeout(
    provider: &dyn MetadataProvider,
    query: &str,
    page: u32,
    limit: Duration,
) -> SearchPage {
    match timeout(limit, provider.search(query, page)).await {
        Ok(Ok(found)) => found,
        Ok(Err(e)) => {
            tracing::warn!("Metadata search for {:?} failed: {}", query, e);
            SearchPage::default()
        }
        Err(_) => {
            tracing::warn!("Metadata search for {:?} timed out", query);
            SearchPage::default()
        }
    }
}

/// Genre hints from a provider, split into genres the user already has and
/// names that would need a new genre
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenreSuggestion {
    /// Ids of existing genres matching a hint
    pub existing: Vec<String>,
    /// Hints with no matching genre, first spelling kept
    pub new_names: Vec<String>,
}

pub fn suggest_genres(hints: &[String], existing: &[Genre]) -> GenreSuggestion {
    let mut suggestion = GenreSuggestion::default();
    let mut seen: Vec<String> = Vec::new();

    for hint in hints {
        let key = normalize_genre_name(hint);
        if key.is_empty() || seen.contains(&key) {
            continue;
        }
        seen.push(key.clone());

        let matched = existing.iter().find(|genre| {
            let theirs = if genre.normalized_name.is_empty() {
                normalize_genre_name(&genre.name)
            } else {
                genre.normalized_name.clone()
            };
            theirs == key
        });
        match matched {
            Some(genre) => suggestion.existing.push(genre.id.clone()),
            None => suggestion.new_names.push(hint.trim().to_string()),
        }
    }
    suggestion
}

/// Prefill an add form from provider data. Genres are left to
/// [`suggest_genres`].
pub fn prefill_book(metadata: &BookMetadata) -> NewBook {
    NewBook {
        title: metadata.title.trim().to_string(),
        author: metadata.author.clone().unwrap_or_default(),
        isbn: metadata.isbn.clone(),
        cover_image_url: metadata.cover_urls.first().cloned(),
        publisher: metadata.publisher.clone(),
        published_date: metadata.published_date.clone(),
        page_count: metadata.page_count,
        ..Default::default()
    }
}

/// Whether a search result looks like a book already owned (ISBN or
/// normalized title)
pub(crate) fn is_owned(candidate: &BookMetadata, owned_isbns: &[String], owned_titles: &[String]) -> bool {
    if let Some(isbn) = &candidate.isbn
        && owned_isbns.iter().any(|owned| owned == isbn)
    {
        return true;
    }
    owned_titles.contains(&normalize_text(Some(&candidate.title)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DomainError;
    use async_trait::async_trait;

    struct SlowProvider;

    #[async_trait]
    impl MetadataProvider for SlowProvider {
        async fn lookup_isbn(&self, _isbn: &str) -> Result<Option<BookMetadata>, DomainError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Some(BookMetadata::default()))
        }

        async fn search(&self, _query: &str, _page: u32) -> Result<SearchPage, DomainError> {
            Err(DomainError::External("provider down".to_string()))
        }
    }

    #[tokio::test]
    async fn slow_lookup_counts_as_no_data() {
        let found = lookup_with_timeout(&SlowProvider, "9780143127550", Duration::from_millis(20)).await;
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn failing_search_yields_empty_page() {
        let page = search_with_timeout(&SlowProvider, "dune", 0, Duration::from_secs(1)).await;
        assert!(page.results.is_empty());
        assert!(!page.has_more);
    }

    #[test]
    fn hints_map_to_existing_genres_by_normalized_name() {
        let existing = vec![Genre {
            id: "g1".into(),
            name: "Science Fiction".into(),
            normalized_name: "science fiction".into(),
            ..Default::default()
        }];
        let hints = vec![
            "science  FICTION".to_string(),
            "Space Opera".to_string(),
            "space opera".to_string(),
            "  ".to_string(),
        ];

        let suggestion = suggest_genres(&hints, &existing);
        assert_eq!(suggestion.existing, vec!["g1".to_string()]);
        assert_eq!(suggestion.new_names, vec!["Space Opera".to_string()]);
    }
}
