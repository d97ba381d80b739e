//! Collaborator trait definitions
//!
//! These traits define the contract for the remote document store and the
//! other opaque collaborators. Implementations live in the infrastructure
//! layer (or in the embedding application).

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use chrono::DateTime;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{DomainError, FieldErrors};

/// Remote collections owned by one user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreCollection {
    Books,
    Genres,
    Series,
    Wishlist,
}

impl StoreCollection {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreCollection::Books => "books",
            StoreCollection::Genres => "genres",
            StoreCollection::Series => "series",
            StoreCollection::Wishlist => "wishlist",
        }
    }
}

impl fmt::Display for StoreCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw document: opaque id plus JSON fields
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Map<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    /// Decode into a typed record; the document id lands in the `id` field
    pub fn decode<T: DeserializeOwned>(self) -> Result<T, DomainError> {
        let mut data = self.data;
        data.insert("id".to_string(), Value::String(self.id));
        Ok(serde_json::from_value(Value::Object(data))?)
    }
}

/// Serialize a record into document fields, dropping its `id`
pub fn encode<T: Serialize>(record: &T) -> Result<Map<String, Value>, DomainError> {
    match serde_json::to_value(record)? {
        Value::Object(mut map) => {
            map.remove("id");
            Ok(map)
        }
        other => Err(DomainError::Internal(format!(
            "Expected an object record, got {}",
            other
        ))),
    }
}

/// Single-field query predicate
#[derive(Debug, Clone, PartialEq)]
pub enum FieldFilter {
    /// `field == value`
    Equals(String, Value),
    /// Array `field` contains `value`
    Contains(String, Value),
}

impl FieldFilter {
    pub fn equals(field: &str, value: impl Into<Value>) -> Self {
        FieldFilter::Equals(field.to_string(), value.into())
    }

    pub fn contains(field: &str, value: impl Into<Value>) -> Self {
        FieldFilter::Contains(field.to_string(), value.into())
    }

    pub fn matches(&self, data: &Map<String, Value>) -> bool {
        match self {
            FieldFilter::Equals(field, value) => data.get(field) == Some(value),
            FieldFilter::Contains(field, value) => data
                .get(field)
                .and_then(Value::as_array)
                .is_some_and(|items| items.contains(value)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: SortDirection,
}

impl OrderBy {
    pub fn desc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            direction: SortDirection::Desc,
        }
    }

    pub fn asc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            direction: SortDirection::Asc,
        }
    }

    /// Compare two documents on this ordering. Missing fields sort first.
    pub fn compare(&self, a: &Map<String, Value>, b: &Map<String, Value>) -> Ordering {
        let ord = compare_values(a.get(&self.field), b.get(&self.field));
        match self.direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        }
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        // Timestamps serialize with a variable number of fractional digits
        (Some(Value::String(x)), Some(Value::String(y))) => {
            match (DateTime::parse_from_rfc3339(x), DateTime::parse_from_rfc3339(y)) {
                (Ok(x), Ok(y)) => x.cmp(&y),
                _ => x.cmp(y),
            }
        }
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Less,
        (_, None | Some(Value::Null)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

/// One queued write inside an atomic batch
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOp {
    Update {
        collection: StoreCollection,
        id: String,
        patch: Map<String, Value>,
    },
    Increment {
        collection: StoreCollection,
        id: String,
        field: String,
        delta: i64,
    },
    Delete {
        collection: StoreCollection,
        id: String,
    },
}

/// Queue of writes committed as one all-or-nothing unit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, collection: StoreCollection, id: &str, patch: Map<String, Value>) {
        self.ops.push(BatchOp::Update {
            collection,
            id: id.to_string(),
            patch,
        });
    }

    pub fn increment(&mut self, collection: StoreCollection, id: &str, field: &str, delta: i64) {
        self.ops.push(BatchOp::Increment {
            collection,
            id: id.to_string(),
            field: field.to_string(),
            delta,
        });
    }

    pub fn delete(&mut self, collection: StoreCollection, id: &str) {
        self.ops.push(BatchOp::Delete {
            collection,
            id: id.to_string(),
        });
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }
}

/// Apply a partial update to document fields. A `null` value removes the field.
pub fn apply_patch(data: &mut Map<String, Value>, patch: Map<String, Value>) {
    for (field, value) in patch {
        if value.is_null() {
            data.remove(&field);
        } else {
            data.insert(field, value);
        }
    }
}

/// Add `delta` to an integer field, treating a missing field as zero
pub fn apply_increment(data: &mut Map<String, Value>, field: &str, delta: i64) {
    let current = data.get(field).and_then(Value::as_i64).unwrap_or(0);
    data.insert(field.to_string(), Value::from(current + delta));
}

/// Repository trait for the remote document store
///
/// Every call is scoped to one user. There are no cross-collection
/// transactions; `commit` is the only multi-document atomic write.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch one document by id
    async fn get(
        &self,
        user_id: &str,
        collection: StoreCollection,
        id: &str,
    ) -> Result<Option<Document>, DomainError>;

    /// Documents matching a single-field predicate, up to `limit`
    async fn find(
        &self,
        user_id: &str,
        collection: StoreCollection,
        filter: FieldFilter,
        limit: Option<u64>,
    ) -> Result<Vec<Document>, DomainError>;

    /// All documents of a collection, optionally ordered and limited
    async fn list(
        &self,
        user_id: &str,
        collection: StoreCollection,
        order: Option<OrderBy>,
        limit: Option<u64>,
    ) -> Result<Vec<Document>, DomainError>;

    /// Insert a document with a store-assigned id
    async fn add(
        &self,
        user_id: &str,
        collection: StoreCollection,
        data: Map<String, Value>,
    ) -> Result<Document, DomainError>;

    /// Partial update; fails with `NotFound` if the document is missing
    async fn update(
        &self,
        user_id: &str,
        collection: StoreCollection,
        id: &str,
        patch: Map<String, Value>,
    ) -> Result<(), DomainError>;

    /// Delete a document; deleting a missing document is not an error
    async fn delete(
        &self,
        user_id: &str,
        collection: StoreCollection,
        id: &str,
    ) -> Result<(), DomainError>;

    /// Atomic per-document increment of an integer field
    async fn increment(
        &self,
        user_id: &str,
        collection: StoreCollection,
        id: &str,
        field: &str,
        delta: i64,
    ) -> Result<(), DomainError>;

    /// Commit a batch as one all-or-nothing unit
    async fn commit(&self, user_id: &str, batch: WriteBatch) -> Result<(), DomainError>;
}

/// Book metadata returned by a lookup provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookMetadata {
    pub title: String,
    pub author: Option<String>,
    pub isbn: Option<String>,
    #[serde(default)]
    pub cover_urls: Vec<String>,
    pub publisher: Option<String>,
    pub published_date: Option<String>,
    pub page_count: Option<u32>,
    #[serde(default)]
    pub genre_hints: Vec<String>,
}

/// One page of free-text search results
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchPage {
    pub results: Vec<BookMetadata>,
    pub has_more: bool,
}

/// External metadata lookup (ISBN or free text)
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Metadata for an ISBN, `None` when the provider has no record
    async fn lookup_isbn(&self, isbn: &str) -> Result<Option<BookMetadata>, DomainError>;

    /// Free-text search, zero-based page
    async fn search(&self, query: &str, page: u32) -> Result<SearchPage, DomainError>;
}

/// Raw form input keyed by field name
pub type RawFields = BTreeMap<String, String>;

/// Schema-driven form validation collaborator
pub trait FormValidator: Send + Sync {
    /// Parsed and normalized data, or a field-keyed error map
    fn validate(&self, schema: &str, raw: &RawFields) -> Result<Value, FieldErrors>;
}
