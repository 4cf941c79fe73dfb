use super::provider::{AuthProvider, AuthToken};
use crate::common::EventHubResult;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Tokens without an advertised lifetime are assumed to last this long.
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

/// Tokens are renewed this long before they expire.
const REFRESH_MARGIN: Duration = Duration::from_secs(300);

/// A cached authentication token with expiration tracking.
#[derive(Clone, Debug)]
pub struct CachedToken {
    pub token: AuthToken,
    pub expires_at: Instant,
}

impl CachedToken {
    pub fn new(token: AuthToken) -> Self {
        let lifetime = token
            .expires_in_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TOKEN_LIFETIME);
        Self {
            token,
            expires_at: Instant::now() + lifetime,
        }
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// True within the refresh margin before expiry.
    pub fn needs_refresh(&self) -> bool {
        Instant::now() + REFRESH_MARGIN >= self.expires_at
    }
}

/// Wraps a provider and reuses its token until it nears expiry.
///
/// Reopening a link after a connection failure does not hit the identity
/// service again while the cached token is still fresh.
pub struct CachingAuthProvider {
    inner: Arc<dyn AuthProvider>,
    cache: RwLock<Option<CachedToken>>,
}

impl CachingAuthProvider {
    pub fn new(inner: Arc<dyn AuthProvider>) -> Self {
        Self {
            inner,
            cache: RwLock::new(None),
        }
    }

    /// Drops the cached token so the next call fetches a new one.
    pub async fn invalidate(&self) {
        self.cache.write().await.take();
    }
}

#[async_trait]
impl AuthProvider for CachingAuthProvider {
    async fn authenticate(&self) -> EventHubResult<AuthToken> {
        if let Some(cached) = self.cache.read().await.as_ref() {
            if !self.inner.requires_refresh() || !cached.needs_refresh() {
                return Ok(cached.token.clone());
            }
        }

        let mut cache = self.cache.write().await;
        // Another caller may have refreshed while we waited for the write lock.
        if let Some(cached) = cache.as_ref() {
            if !self.inner.requires_refresh() || !cached.needs_refresh() {
                return Ok(cached.token.clone());
            }
        }

        let token = match cache.as_ref() {
            Some(cached) if !cached.is_expired() => self.inner.refresh().await?,
            _ => self.inner.authenticate().await?,
        };
        log::debug!("Cached new {} token", token.token_type);
        *cache = Some(CachedToken::new(token.clone()));
        Ok(token)
    }

    async fn refresh(&self) -> EventHubResult<AuthToken> {
        self.invalidate().await;
        self.authenticate().await
    }

    fn requires_refresh(&self) -> bool {
        self.inner.requires_refresh()
    }
}
