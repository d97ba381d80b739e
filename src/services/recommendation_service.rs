//! Recommendation Service - home dashboard suggestions, cached for a day

use chrono::{DateTime, Utc};

use super::metadata_service::{is_owned, search_with_timeout};
use super::records::{Listing, decode_all};
use crate::domain::reading::times_read;
use crate::domain::{DomainError, MetadataProvider, OrderBy, StoreCollection};
use crate::infrastructure::AppContext;
use crate::models::{Book, Recommendation};
use crate::utils::normalize_text;

const MAX_RECOMMENDATIONS: usize = 10;

/// Books sharing one normalized author
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorGroup {
    /// First spelling seen
    pub author: String,
    pub count: usize,
}

/// Group books by normalized author, most books first. Ties keep first-seen
/// order; books without an author are skipped.
pub fn group_by_author<'a>(books: impl IntoIterator<Item = &'a Book>) -> Vec<AuthorGroup> {
    let mut groups: Vec<(String, AuthorGroup)> = Vec::new();
    for book in books {
        let key = normalize_text(Some(&book.author));
        if key.is_empty() {
            continue;
        }
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, group)) => group.count += 1,
            None => groups.push((
                key,
                AuthorGroup {
                    author: book.author.trim().to_string(),
                    count: 1,
                },
            )),
        }
    }

    let mut groups: Vec<AuthorGroup> = groups.into_iter().map(|(_, group)| group).collect();
    groups.sort_by(|a, b| b.count.cmp(&a.count));
    groups
}

async fn recent_live_books(ctx: &AppContext) -> Result<Vec<Book>, DomainError> {
    let docs = ctx
        .store
        .list(
            &ctx.user_id,
            StoreCollection::Books,
            Some(OrderBy::desc("createdAt")),
            Some(ctx.config.duplicate_scan_limit),
        )
        .await?;
    Ok(decode_all::<Book>(docs)?
        .into_iter()
        .filter(|book| !book.is_deleted())
        .collect())
}

/// Suggestions by the author the user has finished most books of, minus
/// titles already owned
pub async fn get_recommendations(
    ctx: &AppContext,
    provider: &dyn MetadataProvider,
    now: DateTime<Utc>,
) -> Listing<Recommendation> {
    if let Some(entry) = ctx.cache.read::<Recommendation>(&ctx.user_id, now) {
        tracing::debug!("Recommendations cache hit");
        return entry.into();
    }

    let books = match recent_live_books(ctx).await {
        Ok(books) => books,
        Err(e) => {
            tracing::warn!("Failed to load books for recommendations: {}", e);
            return Listing::failed(&e);
        }
    };

    let top = group_by_author(books.iter().filter(|book| times_read(book) > 0))
        .into_iter()
        .next();
    let Some(top) = top else {
        ctx.cache.write::<Recommendation>(&ctx.user_id, Vec::new(), true, now);
        return Listing::ok(Vec::new(), true);
    };

    let owned_isbns: Vec<String> = books.iter().filter_map(|book| book.isbn.clone()).collect();
    let owned_titles: Vec<String> = books
        .iter()
        .map(|book| normalize_text(Some(&book.title)))
        .collect();

    let page = search_with_timeout(provider, &top.author, 0, ctx.config.metadata_timeout).await;
    let recommendations: Vec<Recommendation> = page
        .results
        .into_iter()
        .filter(|candidate| !is_owned(candidate, &owned_isbns, &owned_titles))
        .take(MAX_RECOMMENDATIONS)
        .map(|candidate| Recommendation {
            author: candidate.author.unwrap_or_else(|| top.author.clone()),
            title: candidate.title,
            isbn: candidate.isbn,
            cover_url: candidate.cover_urls.into_iter().next(),
            because_of: top.author.clone(),
        })
        .collect();

    tracing::info!(
        "Built {} recommendations from author {}",
        recommendations.len(),
        top.author
    );
    ctx.cache.write(&ctx.user_id, recommendations.clone(), true, now);
    Listing::ok(recommendations, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn by(author: &str) -> Book {
        Book {
            title: "t".into(),
            author: author.into(),
            ..Default::default()
        }
    }

    #[test]
    fn groups_accent_and_case_variants_together() {
        let books = vec![
            by("Émile Zola"),
            by("Victor Hugo"),
            by("emile  ZOLA"),
            by(""),
            by("Victor Hugo"),
            by("Emile Zola"),
        ];
        let groups = group_by_author(&books);
        assert_eq!(
            groups,
            vec![
                AuthorGroup {
                    author: "Émile Zola".into(),
                    count: 3
                },
                AuthorGroup {
                    author: "Victor Hugo".into(),
                    count: 2
                },
            ]
        );
    }
}
