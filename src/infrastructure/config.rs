use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default bound on the title/author duplicate and author-grouping scans
pub const DEFAULT_DUPLICATE_SCAN_LIMIT: u64 = 200;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub profile: String,
    /// When set, the local cache persists as JSON files here
    pub cache_dir: Option<PathBuf>,
    pub duplicate_scan_limit: u64,
    pub books_page_size: u64,
    pub metadata_timeout: Duration,
    pub trash_retention_days: i64,
    pub gravatar_base_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: database_url_for("default"),
            profile: "default".to_string(),
            cache_dir: None,
            duplicate_scan_limit: DEFAULT_DUPLICATE_SCAN_LIMIT,
            books_page_size: 50,
            metadata_timeout: Duration::from_millis(5000),
            trash_retention_days: 30,
            gravatar_base_url: "https://gravatar.com".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let profile = env::var("PROFILE").unwrap_or_else(|_| "default".to_string());

        let database_url = env::var("DATABASE_URL").unwrap_or_else(|_| database_url_for(&profile));

        Self {
            database_url,
            cache_dir: env::var("CACHE_DIR")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            duplicate_scan_limit: parse_var::<u64>("DUPLICATE_SCAN_LIMIT")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.duplicate_scan_limit),
            books_page_size: parse_var::<u64>("BOOKS_PAGE_SIZE")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.books_page_size),
            metadata_timeout: parse_var::<u64>("METADATA_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.metadata_timeout),
            trash_retention_days: parse_var::<i64>("TRASH_RETENTION_DAYS")
                .unwrap_or(defaults.trash_retention_days),
            gravatar_base_url: env::var("GRAVATAR_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.gravatar_base_url),
            profile,
        }
    }
}

fn database_url_for(profile: &str) -> String {
    if profile == "default" {
        "sqlite://librarium.db?mode=rwc".to_string()
    } else {
        format!("sqlite://librarium_{}.db?mode=rwc", profile)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const KEYS: [&str; 6] = [
        "PROFILE",
        "DATABASE_URL",
        "CACHE_DIR",
        "DUPLICATE_SCAN_LIMIT",
        "METADATA_TIMEOUT_MS",
        "GRAVATAR_BASE_URL",
    ];

    fn clear_env() {
        for key in KEYS {
            // SAFETY: tests touching the environment are serialized
            unsafe { env::remove_var(key) };
        }
    }

    #[test]
    #[serial]
    fn defaults_without_environment() {
        clear_env();
        let config = Config::from_env();
        assert_eq!(config.database_url, "sqlite://librarium.db?mode=rwc");
        assert_eq!(config.duplicate_scan_limit, 200);
        assert!(config.cache_dir.is_none());
        assert_eq!(config.metadata_timeout, Duration::from_secs(5));
    }

    #[test]
    #[serial]
    fn profile_and_overrides() {
        clear_env();
        unsafe {
            env::set_var("PROFILE", "alice");
            env::set_var("DUPLICATE_SCAN_LIMIT", "50");
            env::set_var("METADATA_TIMEOUT_MS", "not-a-number");
            env::set_var("GRAVATAR_BASE_URL", "http://localhost:9000/");
        }
        let config = Config::from_env();
        assert_eq!(config.database_url, "sqlite://librarium_alice.db?mode=rwc");
        assert_eq!(config.duplicate_scan_limit, 50);
        assert_eq!(config.metadata_timeout, Duration::from_secs(5));
        assert_eq!(config.gravatar_base_url, "http://localhost:9000");
        clear_env();
    }
}
