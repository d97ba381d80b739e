//! Typed access to the remote store and the read-path result type

use serde::de::DeserializeOwned;

use crate::domain::{Document, DomainError, OrderBy, StoreCollection};
use crate::infrastructure::{AppContext, CacheEntry};

/// Result of a read path. Failures degrade to an empty listing carrying a
/// user-visible error instead of aborting the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing<T> {
    pub records: Vec<T>,
    /// Whether `records` is the whole collection rather than its first page
    pub is_complete: bool,
    pub error: Option<String>,
}

impl<T> Listing<T> {
    pub fn ok(records: Vec<T>, is_complete: bool) -> Self {
        Self {
            records,
            is_complete,
            error: None,
        }
    }

    pub fn failed(error: &DomainError) -> Self {
        Self {
            records: Vec::new(),
            is_complete: false,
            error: Some(error.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

impl<T> From<CacheEntry<T>> for Listing<T> {
    fn from(entry: CacheEntry<T>) -> Self {
        Listing::ok(entry.records, entry.is_complete)
    }
}

pub(crate) fn decode_all<T: DeserializeOwned>(docs: Vec<Document>) -> Result<Vec<T>, DomainError> {
    docs.into_iter().map(Document::decode).collect()
}

/// Fetch and decode one record, `NotFound` if missing
pub(crate) async fn fetch_one<T: DeserializeOwned>(
    ctx: &AppContext,
    collection: StoreCollection,
    id: &str,
) -> Result<T, DomainError> {
    ctx.store
        .get(&ctx.user_id, collection, id)
        .await?
        .ok_or(DomainError::NotFound)?
        .decode()
}

/// Fetch and decode a whole collection straight from the store
pub(crate) async fn fetch_all<T: DeserializeOwned>(
    ctx: &AppContext,
    collection: StoreCollection,
    order: Option<OrderBy>,
) -> Result<Vec<T>, DomainError> {
    let docs = ctx.store.list(&ctx.user_id, collection, order, None).await?;
    decode_all(docs)
}
