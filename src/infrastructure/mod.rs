//! Infrastructure layer - Framework implementations
//!
//! This layer contains:
//! - Database connection and migrations (db)
//! - Configuration loading (config)
//! - Remote document store implementation (repositories)
//! - Local snapshot cache (cache)
//! - Per-user operation context (state)

pub mod cache;
pub mod config;
pub mod db;
pub mod repositories;
pub mod state;

pub use cache::{CacheEntry, CacheKind, CacheStore, FileCacheStore, LocalCache, MemoryCacheStore};
pub use config::Config;
pub use repositories::*;
pub use state::AppContext;
