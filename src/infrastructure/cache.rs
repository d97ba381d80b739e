//! Local cache of remote collection snapshots
//!
//! Entries are keyed by (user id, kind) and carry a schema version, a capture
//! time and a completeness flag. The payload is kept as raw JSON by the
//! backing store and decoded into a kind-tagged [`CachePayload`] only after
//! the version check passes. Entries are snapshots, never sources of truth:
//! concurrent writers simply overwrite each other.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::models::{Book, Genre, GravatarProbe, Recommendation, Series, WishlistItem};

/// Bump whenever the shape of any cached record changes
pub const CACHE_SCHEMA_VERSION: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheKind {
    Books,
    Genres,
    Series,
    Wishlist,
    Recommendations,
    GravatarProbe,
}

impl CacheKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKind::Books => "books",
            CacheKind::Genres => "genres",
            CacheKind::Series => "series",
            CacheKind::Wishlist => "wishlist",
            CacheKind::Recommendations => "recommendations",
            CacheKind::GravatarProbe => "gravatar-probe",
        }
    }

    /// Collections mutated through this crate have no TTL; they are
    /// invalidated on every write instead.
    pub fn ttl(&self) -> Option<Duration> {
        match self {
            CacheKind::Recommendations | CacheKind::GravatarProbe => Some(Duration::hours(24)),
            _ => None,
        }
    }
}

/// Entry as persisted by a [`CacheStore`], payload still undecoded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredEntry {
    pub schema_version: u32,
    pub captured_at: DateTime<Utc>,
    pub is_complete: bool,
    pub payload: Value,
}

/// Backing storage for cache entries. Lookups are synchronous and never block
/// on the network; write failures are logged and swallowed.
pub trait CacheStore: Send + Sync {
    fn load(&self, user_id: &str, kind: CacheKind) -> Option<StoredEntry>;
    fn save(&self, user_id: &str, kind: CacheKind, entry: StoredEntry);
    fn remove(&self, user_id: &str, kind: CacheKind);
}

/// Kind-tagged cached records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "records", rename_all = "kebab-case")]
pub enum CachePayload {
    Books(Vec<Book>),
    Genres(Vec<Genre>),
    Series(Vec<Series>),
    Wishlist(Vec<WishlistItem>),
    Recommendations(Vec<Recommendation>),
    GravatarProbe(Vec<GravatarProbe>),
}

impl CachePayload {
    pub fn kind(&self) -> CacheKind {
        match self {
            CachePayload::Books(_) => CacheKind::Books,
            CachePayload::Genres(_) => CacheKind::Genres,
            CachePayload::Series(_) => CacheKind::Series,
            CachePayload::Wishlist(_) => CacheKind::Wishlist,
            CachePayload::Recommendations(_) => CacheKind::Recommendations,
            CachePayload::GravatarProbe(_) => CacheKind::GravatarProbe,
        }
    }
}

/// A record type that has its own cache kind
pub trait CacheRecord: Serialize + DeserializeOwned + Clone {
    const KIND: CacheKind;

    fn wrap(records: Vec<Self>) -> CachePayload;

    fn unwrap(payload: CachePayload) -> Option<Vec<Self>>;
}

macro_rules! cache_record {
    ($record:ty, $variant:ident) => {
        impl CacheRecord for $record {
            const KIND: CacheKind = CacheKind::$variant;

            fn wrap(records: Vec<Self>) -> CachePayload {
                CachePayload::$variant(records)
            }

            fn unwrap(payload: CachePayload) -> Option<Vec<Self>> {
                match payload {
                    CachePayload::$variant(records) => Some(records),
                    _ => None,
                }
            }
        }
    };
}

cache_record!(Book, Books);
cache_record!(Genre, Genres);
cache_record!(Series, Series);
cache_record!(WishlistItem, Wishlist);
cache_record!(Recommendation, Recommendations);
cache_record!(GravatarProbe, GravatarProbe);

/// A decoded, version-checked, fresh cache entry
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub records: Vec<T>,
    pub captured_at: DateTime<Utc>,
    /// Whether the whole remote collection was captured, not just a page
    pub is_complete: bool,
}

/// An entry captured "in the future" (clock skew) is never trusted.
fn is_fresh(ttl: Option<Duration>, captured_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    let age = now - captured_at;
    if age < Duration::zero() {
        return false;
    }
    ttl.is_none_or(|ttl| age < ttl)
}

/// Typed front of the local cache, shared by every operation of a context
#[derive(Clone)]
pub struct LocalCache {
    store: Arc<dyn CacheStore>,
}

impl LocalCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryCacheStore::new()))
    }

    /// Fresh entry for `T`, or `None` when absent, stale, from another schema
    /// version, or undecodable
    pub fn read<T: CacheRecord>(&self, user_id: &str, now: DateTime<Utc>) -> Option<CacheEntry<T>> {
        let stored = self.store.load(user_id, T::KIND)?;

        if stored.schema_version != CACHE_SCHEMA_VERSION {
            tracing::debug!(
                "Discarding {} cache entry with schema version {} (expected {})",
                T::KIND.as_str(),
                stored.schema_version,
                CACHE_SCHEMA_VERSION
            );
            self.store.remove(user_id, T::KIND);
            return None;
        }

        if !is_fresh(T::KIND.ttl(), stored.captured_at, now) {
            tracing::debug!("{} cache entry is stale", T::KIND.as_str());
            return None;
        }

        let records = serde_json::from_value::<CachePayload>(stored.payload)
            .ok()
            .and_then(T::unwrap);

        match records {
            Some(records) => Some(CacheEntry {
                records,
                captured_at: stored.captured_at,
                is_complete: stored.is_complete,
            }),
            None => {
                tracing::warn!("Dropping malformed {} cache entry", T::KIND.as_str());
                self.store.remove(user_id, T::KIND);
                None
            }
        }
    }

    /// Like [`read`](Self::read), but only entries holding the full collection
    pub fn read_complete<T: CacheRecord>(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Option<CacheEntry<T>> {
        self.read::<T>(user_id, now).filter(|entry| entry.is_complete)
    }

    pub fn write<T: CacheRecord>(
        &self,
        user_id: &str,
        records: Vec<T>,
        is_complete: bool,
        now: DateTime<Utc>,
    ) {
        let payload = match serde_json::to_value(T::wrap(records)) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("Failed to encode {} cache entry: {}", T::KIND.as_str(), e);
                return;
            }
        };

        self.store.save(
            user_id,
            T::KIND,
            StoredEntry {
                schema_version: CACHE_SCHEMA_VERSION,
                captured_at: now,
                is_complete,
                payload,
            },
        );
    }

    pub fn invalidate(&self, user_id: &str, kind: CacheKind) {
        tracing::debug!("Invalidating {} cache", kind.as_str());
        self.store.remove(user_id, kind);
    }
}

/// Process-local cache backend
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: DashMap<(String, CacheKind), StoredEntry>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryCacheStore {
    fn load(&self, user_id: &str, kind: CacheKind) -> Option<StoredEntry> {
        self.entries
            .get(&(user_id.to_string(), kind))
            .map(|entry| entry.value().clone())
    }

    fn save(&self, user_id: &str, kind: CacheKind, entry: StoredEntry) {
        self.entries.insert((user_id.to_string(), kind), entry);
    }

    fn remove(&self, user_id: &str, kind: CacheKind) {
        self.entries.remove(&(user_id.to_string(), kind));
    }
}

/// Cache backend persisting one JSON file per (user, kind)
pub struct FileCacheStore {
    root: PathBuf,
}

impl FileCacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// User ids are opaque, so the directory name is their SHA-256
    fn path_for(&self, user_id: &str, kind: CacheKind) -> PathBuf {
        let user_dir = hex::encode(Sha256::digest(user_id.as_bytes()));
        self.root
            .join(user_dir)
            .join(format!("{}.json", kind.as_str()))
    }

    fn write_file(path: &Path, entry: &StoredEntry) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let body = serde_json::to_vec(entry)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, body)?;
        fs::rename(tmp, path)
    }
}

impl CacheStore for FileCacheStore {
    fn load(&self, user_id: &str, kind: CacheKind) -> Option<StoredEntry> {
        let path = self.path_for(user_id, kind);
        let body = match fs::read(&path) {
            Ok(body) => body,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("Failed to read cache file {:?}: {}", path, e);
                return None;
            }
        };

        match serde_json::from_slice(&body) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("Ignoring corrupt cache file {:?}: {}", path, e);
                None
            }
        }
    }

    fn save(&self, user_id: &str, kind: CacheKind, entry: StoredEntry) {
        let path = self.path_for(user_id, kind);
        if let Err(e) = Self::write_file(&path, &entry) {
            tracing::warn!("Failed to write cache file {:?}: {}", path, e);
        }
    }

    fn remove(&self, user_id: &str, kind: CacheKind) {
        let path = self.path_for(user_id, kind);
        if let Err(e) = fs::remove_file(&path)
            && e.kind() != ErrorKind::NotFound
        {
            tracing::warn!("Failed to remove cache file {:?}: {}", path, e);
        }
    }
}
