//! Repository visibility lookups with a TTL cache
//!
//! Failed lookups are cached like successful ones, so a flapping upstream is
//! asked at most once per TTL window. Write checks use a shorter TTL than
//! reads. Any failure (no token, 404, other status, network error, timeout)
//! comes back as `None`, never as a guess.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::github::client::{GitHubError, VisibilityApi};
use crate::github::token::TokenSource;

pub const DEFAULT_READ_TTL_SECS: i64 = 300;
pub const DEFAULT_WRITE_TTL_SECS: i64 = 60;
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
    Internal,
}

impl Visibility {
    /// Parse the `visibility` field of a repository response
    ///
    /// Values GitHub may add later map to `None` rather than to a guess.
    pub fn from_api(value: &str) -> Option<Self> {
        match value {
            "public" => Some(Self::Public),
            "private" => Some(Self::Private),
            "internal" => Some(Self::Internal),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
            Self::Internal => "internal",
        }
    }

    pub fn is_private(self) -> bool {
        matches!(self, Self::Private | Self::Internal)
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A memoized lookup; `visibility` is `None` when the lookup failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedVisibility {
    pub owner: String,
    pub repo: String,
    pub visibility: Option<Visibility>,
    pub fetched_at: DateTime<Utc>,
}

impl CachedVisibility {
    pub fn new(owner: &str, repo: &str, visibility: Option<Visibility>) -> Self {
        Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            visibility,
            fetched_at: Utc::now(),
        }
    }

    /// A zero or negative TTL means "always refresh", never "valid forever"
    pub fn is_stale(&self, ttl: TimeDelta) -> bool {
        self.is_stale_at(Utc::now(), ttl)
    }

    pub fn is_stale_at(&self, now: DateTime<Utc>, ttl: TimeDelta) -> bool {
        ttl <= TimeDelta::zero() || now - self.fetched_at >= ttl
    }
}

type CacheKey = (String, String);

fn cache_key(owner: &str, repo: &str) -> CacheKey {
    (owner.to_lowercase(), repo.to_lowercase())
}

pub struct RepoVisibilityChecker {
    api: Arc<dyn VisibilityApi>,
    tokens: Arc<dyn TokenSource>,
    read_ttl: TimeDelta,
    write_ttl: TimeDelta,
    lookup_timeout: Duration,
    cache: Mutex<HashMap<CacheKey, CachedVisibility>>,
}

impl RepoVisibilityChecker {
    pub fn new(api: Arc<dyn VisibilityApi>, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            api,
            tokens,
            read_ttl: TimeDelta::seconds(DEFAULT_READ_TTL_SECS),
            write_ttl: TimeDelta::seconds(DEFAULT_WRITE_TTL_SECS),
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_ttls(mut self, read_ttl: TimeDelta, write_ttl: TimeDelta) -> Self {
        self.read_ttl = read_ttl;
        self.write_ttl = write_ttl;
        self
    }

    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    /// Visibility of `owner/repo`, from cache when fresh
    pub async fn get_visibility(&self, owner: &str, repo: &str, for_write: bool) -> Option<Visibility> {
        let key = cache_key(owner, repo);
        let ttl = if for_write { self.write_ttl } else { self.read_ttl };

        if let Some(entry) = self.lock_cache().get(&key) {
            if !entry.is_stale(ttl) {
                debug!(owner, repo, visibility = ?entry.visibility, "visibility cache hit");
                return entry.visibility;
            }
        }

        let visibility = self.lookup(owner, repo).await;

        // Last writer wins when two requests race on the same key
        self.lock_cache()
            .insert(key, CachedVisibility::new(owner, repo, visibility));

        visibility
    }

    /// `true` only for private and internal repositories
    ///
    /// Unknown visibility reads as `false` here; the access policy makes its
    /// own fail-closed decision and does not go through this predicate.
    pub async fn is_private(&self, owner: &str, repo: &str) -> bool {
        self.get_visibility(owner, repo, false)
            .await
            .is_some_and(Visibility::is_private)
    }

    pub fn invalidate(&self, owner: &str, repo: &str) {
        self.lock_cache().remove(&cache_key(owner, repo));
    }

    pub fn clear_cache(&self) {
        self.lock_cache().clear();
    }

    pub fn cached(&self, owner: &str, repo: &str) -> Option<CachedVisibility> {
        self.lock_cache().get(&cache_key(owner, repo)).cloned()
    }

    async fn lookup(&self, owner: &str, repo: &str) -> Option<Visibility> {
        let Some(token) = self.tokens.get_token().await else {
            warn!(owner, repo, "no GitHub token available; visibility unknown");
            return None;
        };

        let request = self.api.fetch_visibility(owner, repo, &token);
        let result = match tokio::time::timeout(self.lookup_timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(GitHubError::Timeout),
        };

        match result {
            Ok(visibility) => {
                debug!(owner, repo, ?visibility, "fetched repository visibility");
                visibility
            }
            Err(GitHubError::NotFound) => {
                info!(owner, repo, "repository not found or not accessible");
                None
            }
            Err(e) => {
                warn!(owner, repo, error = %e, "visibility lookup failed");
                None
            }
        }
    }

    fn lock_cache(&self) -> MutexGuard<'_, HashMap<CacheKey, CachedVisibility>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
