// ── Watcher token store ──
//
// Two states: no usable token under the cache key (Unset) or a token that
// has not expired yet (Valid). A miss triggers one login; a successful login
// stores the token with the server-provided expiry.
//
// Concurrent misses are not coalesced: each caller logs in on its own and
// the last write wins. LAPI accepts every issued token until it expires.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use secrecy::SecretString;
use tracing::{debug, warn};

use crate::error::Error;
use crate::models::LoginResponse;

/// Cache key holding the watcher's bearer token.
pub const TOKEN_CACHE_KEY: &str = "crowdsec_watcher_token";

/// A bearer token with its expiry.
#[derive(Debug, Clone)]
pub struct Token {
    value: SecretString,
    expires_at: DateTime<Utc>,
}

impl Token {
    pub fn new(value: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            value: SecretString::from(value.into()),
            expires_at,
        }
    }

    pub fn value(&self) -> &SecretString {
        &self.value
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// Key/value storage for tokens. Implementations must not return an
/// expired token from `get`.
pub trait TokenCache: Send + Sync {
    fn get(&self, key: &str) -> Option<Token>;
    fn set(&self, key: &str, token: Token);
}

/// Process-local token cache.
#[derive(Debug, Default)]
pub struct MemoryTokenCache {
    entries: DashMap<String, Token>,
}

impl MemoryTokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TokenCache for MemoryTokenCache {
    fn get(&self, key: &str) -> Option<Token> {
        let token = self.entries.get(key).map(|entry| entry.value().clone())?;
        if token.is_expired() {
            self.entries.remove(key);
            return None;
        }
        Some(token)
    }

    fn set(&self, key: &str, token: Token) {
        self.entries.insert(key.to_owned(), token);
    }
}

/// Hands out the watcher's bearer token, logging in when the cache has none.
#[derive(Clone)]
pub struct TokenStore {
    cache: Arc<dyn TokenCache>,
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore").finish_non_exhaustive()
    }
}

impl TokenStore {
    pub fn new(cache: Arc<dyn TokenCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<dyn TokenCache> {
        &self.cache
    }

    /// Cached token, or a fresh one from `login`.
    ///
    /// Returns `Ok(None)` when login answers with a code other than 200;
    /// the caller decides what that means.
    pub async fn retrieve_token<F, Fut>(&self, login: F) -> Result<Option<SecretString>, Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<LoginResponse, Error>>,
    {
        if let Some(token) = self.cache.get(TOKEN_CACHE_KEY) {
            debug!(expires_at = %token.expires_at(), "using cached watcher token");
            return Ok(Some(token.value().clone()));
        }

        let response = login().await?;
        if response.code != 200 {
            warn!(code = response.code, "watcher login refused");
            return Ok(None);
        }

        let (Some(value), Some(expire)) = (response.token, response.expire) else {
            return Err(Error::client(
                "Login response is missing the token or its expiry",
            ));
        };
        let expires_at = DateTime::parse_from_rfc3339(&expire)
            .map_err(|e| Error::Client {
                message: format!("Invalid token expiry \"{expire}\""),
                status: None,
                source: Some(Box::new(e)),
            })?
            .with_timezone(&Utc);

        let token = Token::new(value, expires_at);
        let secret = token.value().clone();
        self.cache.set(TOKEN_CACHE_KEY, token);
        debug!(%expires_at, "stored new watcher token");

        Ok(Some(secret))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::Duration;
    use secrecy::ExposeSecret;

    use super::*;

    fn login_ok(token: &str, expire: DateTime<Utc>) -> LoginResponse {
        LoginResponse {
            code: 200,
            expire: Some(expire.to_rfc3339()),
            token: Some(token.into()),
            message: None,
        }
    }

    #[tokio::test]
    async fn miss_logs_in_and_caches() {
        let store = TokenStore::new(Arc::new(MemoryTokenCache::new()));
        let logins = AtomicUsize::new(0);
        let expire = Utc::now() + Duration::hours(1);

        for _ in 0..2 {
            let token = store
                .retrieve_token(|| async {
                    logins.fetch_add(1, Ordering::SeqCst);
                    Ok(login_ok("jwt", expire))
                })
                .await
                .unwrap()
                .unwrap();
            assert_eq!(token.expose_secret(), "jwt");
        }

        assert_eq!(logins.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refused_login_yields_none_and_caches_nothing() {
        let cache = Arc::new(MemoryTokenCache::new());
        let store = TokenStore::new(cache.clone());

        let token = store
            .retrieve_token(|| async { Ok(LoginResponse::rejected(401, None)) })
            .await
            .unwrap();

        assert!(token.is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn expired_entry_triggers_new_login() {
        let cache = Arc::new(MemoryTokenCache::new());
        cache.set(
            TOKEN_CACHE_KEY,
            Token::new("old", Utc::now() - Duration::seconds(1)),
        );
        let store = TokenStore::new(cache);

        let token = store
            .retrieve_token(|| async { Ok(login_ok("new", Utc::now() + Duration::hours(1))) })
            .await
            .unwrap()
            .unwrap();

        assert_eq!(token.expose_secret(), "new");
    }

    #[tokio::test]
    async fn bad_expiry_is_a_client_error() {
        let store = TokenStore::new(Arc::new(MemoryTokenCache::new()));
        let err = store
            .retrieve_token(|| async {
                Ok(LoginResponse {
                    code: 200,
                    expire: Some("tomorrow".into()),
                    token: Some("jwt".into()),
                    message: None,
                })
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Client { .. }));
        assert!(err.to_string().contains("tomorrow"));
    }

    #[tokio::test]
    async fn login_error_propagates() {
        let store = TokenStore::new(Arc::new(MemoryTokenCache::new()));
        let err = store
            .retrieve_token(|| async { Err(Error::client("boom")) })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }
}
