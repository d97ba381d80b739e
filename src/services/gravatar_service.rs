//! Gravatar existence probe, cached for a day per email hash

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::domain::DomainError;
use crate::infrastructure::AppContext;
use crate::models::GravatarProbe;

/// SHA-256 hex of the trimmed, lower-cased email
pub fn email_hash(email: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(email.trim().to_lowercase().as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Clone)]
pub struct GravatarClient {
    client: reqwest::Client,
    base_url: String,
}

impl GravatarClient {
    pub fn new(base_url: impl Into<String>, timeout: std::time::Duration) -> Result<Self, DomainError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DomainError::External(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_context(ctx: &AppContext) -> Result<Self, DomainError> {
        Self::new(ctx.config.gravatar_base_url.clone(), ctx.config.metadata_timeout)
    }

    async fn probe(&self, hash: &str) -> Result<bool, DomainError> {
        let url = format!("{}/avatar/{}?d=404", self.base_url, hash);
        let res = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| DomainError::External(e.to_string()))?;

        match res.status() {
            reqwest::StatusCode::OK => Ok(true),
            reqwest::StatusCode::NOT_FOUND => Ok(false),
            status => Err(DomainError::External(format!(
                "Unexpected gravatar status {}",
                status
            ))),
        }
    }

    /// Whether `email` has a gravatar. Failed probes answer `false` and are
    /// not cached, so the next call tries again.
    pub async fn has_gravatar(&self, ctx: &AppContext, email: &str, now: DateTime<Utc>) -> bool {
        let hash = email_hash(email);
        let cached: Vec<GravatarProbe> = ctx
            .cache
            .read::<GravatarProbe>(&ctx.user_id, now)
            .map(|entry| entry.records)
            .unwrap_or_default();

        if let Some(hit) = cached.iter().find(|probe| probe.hash == hash) {
            return hit.exists;
        }

        match self.probe(&hash).await {
            Ok(exists) => {
                let mut probes = cached;
                probes.push(GravatarProbe {
                    hash,
                    exists,
                });
                ctx.cache.write(&ctx.user_id, probes, true, now);
                exists
            }
            Err(e) => {
                tracing::warn!("Gravatar probe failed: {}", e);
                false
            }
        }
    }
}
