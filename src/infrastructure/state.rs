//! Per-user operation context
//!
//! Every service call receives the acting user, the remote store, the local
//! cache and the configuration explicitly; nothing lives in module state.

use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

use super::cache::{FileCacheStore, LocalCache, MemoryCacheStore};
use super::config::Config;
use super::repositories::SeaOrmDocumentStore;
use crate::domain::DocumentStore;

#[derive(Clone)]
pub struct AppContext {
    /// User every read and write is scoped to
    pub user_id: String,
    /// Remote document store
    pub store: Arc<dyn DocumentStore>,
    /// Local snapshot cache
    pub cache: LocalCache,
    pub config: Config,
}

impl AppContext {
    pub fn new(
        user_id: impl Into<String>,
        store: Arc<dyn DocumentStore>,
        cache: LocalCache,
        config: Config,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            store,
            cache,
            config,
        }
    }

    /// Context backed by SQLite, with the cache backend chosen by `CACHE_DIR`
    pub fn with_database(user_id: impl Into<String>, db: DatabaseConnection, config: Config) -> Self {
        let cache = match &config.cache_dir {
            Some(dir) => LocalCache::new(Arc::new(FileCacheStore::new(dir.clone()))),
            None => LocalCache::new(Arc::new(MemoryCacheStore::new())),
        };
        Self::new(user_id, Arc::new(SeaOrmDocumentStore::new(db)), cache, config)
    }

    /// Same store, cache and config for another user
    pub fn for_user(&self, user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..self.clone()
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
