use std::sync::Mutex;

use chrono::{DateTime, Utc};
use http::Uri;
use thiserror::Error;
use tracing::debug;

use crate::token::{AccessToken, DEFAULT_TOKEN_TYPE, TokenRecord};

/// Cached tokens this close to expiry (or past it) are treated as unusable.
const EXPIRATION_FLOOR_SECS: i64 = 5 * 60;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CredentialType {
    AccessToken,
}

/// One persisted credential, as held by the cache store.
///
/// `expires_on` and `refresh_on` are absolute unix instants; the relative
/// durations of [`TokenRecord`] are recomputed against them on every lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub client_id: Option<String>,
    pub environment: String,
    pub realm: String,
    pub home_account_id: Option<String>,
    pub target: String,
    pub secret: AccessToken,
    pub token_type: Option<String>,
    pub expires_on: i64,
    pub refresh_on: Option<i64>,
}

/// Key fields a `find` call filters on, besides the target resource.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CacheQuery {
    pub client_id: Option<String>,
    pub environment: String,
    pub realm: String,
    pub home_account_id: Option<String>,
}

/// Write-back event after a successful fresh fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheAddition {
    pub client_id: Option<String>,
    pub scope: Vec<String>,
    pub token_endpoint: String,
    pub response: TokenRecord,
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("acquiring cache store lock")]
    PoisonError,
    #[error("cache store failure: `{0}`")]
    StoreError(String),
}

/// The credential cache collaborator. Persistence discipline (locking,
/// multi-process safety) is entirely the implementor's concern.
pub trait TokenCache {
    fn find(
        &self,
        credential_type: CredentialType,
        target: &[String],
        query: &CacheQuery,
    ) -> Result<Vec<CacheEntry>, CacheError>;

    fn add(&self, addition: CacheAddition) -> Result<(), CacheError>;
}

/// Outcome of a cache consultation.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheDecision {
    /// Usable as-is; no network call needed.
    Fresh(TokenRecord),
    /// Still valid, but its `refresh_on` instant has passed: hold it as a
    /// fallback and refresh proactively.
    Aging(TokenRecord),
    Miss,
}

/// Scans the cache for a usable token. The first usable candidate decides
/// the outcome; expired entries are skipped, not deleted, since the next
/// successful fetch overwrites them.
pub fn lookup<T>(
    cache: &T,
    resource: &str,
    query: &CacheQuery,
    now: DateTime<Utc>,
) -> Result<CacheDecision, CacheError>
where
    T: TokenCache,
{
    let entries = cache.find(CredentialType::AccessToken, &[resource.to_owned()], query)?;
    let now = now.timestamp();

    for entry in entries {
        let expires_in = entry.expires_on - now;
        if expires_in < EXPIRATION_FLOOR_SECS {
            continue;
        }
        debug!("cache hit an access token");
        let record = TokenRecord {
            access_token: entry.secret,
            token_type: entry
                .token_type
                .unwrap_or_else(|| DEFAULT_TOKEN_TYPE.to_owned()),
            expires_in,
            resource: None,
            refresh_in: entry.refresh_on.map(|refresh_on| refresh_on - now),
        };
        if entry.refresh_on.is_some_and(|refresh_on| refresh_on < now) {
            return Ok(CacheDecision::Aging(record));
        }
        return Ok(CacheDecision::Fresh(record));
    }
    Ok(CacheDecision::Miss)
}

/// Process-local cache store, used when no external store is injected.
#[derive(Debug, Default)]
pub struct InMemoryTokenCache {
    entries: Mutex<Vec<CacheEntry>>,
}

impl TokenCache for InMemoryTokenCache {
    fn find(
        &self,
        _credential_type: CredentialType,
        target: &[String],
        query: &CacheQuery,
    ) -> Result<Vec<CacheEntry>, CacheError> {
        let entries = self.entries.lock().map_err(|_| CacheError::PoisonError)?;
        Ok(entries
            .iter()
            .filter(|entry| {
                entry.client_id == query.client_id
                    && entry.environment == query.environment
                    && entry.realm == query.realm
                    && entry.home_account_id == query.home_account_id
                    && matches_target(&entry.target, target)
            })
            .cloned()
            .collect())
    }

    fn add(&self, addition: CacheAddition) -> Result<(), CacheError> {
        let (environment, realm) = split_token_endpoint(&addition.token_endpoint)?;
        let now = Utc::now().timestamp();
        let response = addition.response;

        let entry = CacheEntry {
            client_id: addition.client_id,
            environment,
            realm,
            home_account_id: None,
            target: addition.scope.join(" "),
            secret: response.access_token,
            token_type: Some(response.token_type),
            expires_on: now + response.expires_in,
            refresh_on: response.refresh_in.map(|refresh_in| now + refresh_in),
        };

        let mut entries = self.entries.lock().map_err(|_| CacheError::PoisonError)?;
        entries.retain(|existing| {
            !(existing.client_id == entry.client_id
                && existing.environment == entry.environment
                && existing.realm == entry.realm
                && existing.target == entry.target)
        });
        entries.push(entry);
        Ok(())
    }
}

/// An entry serves a search when its target set covers every searched scope.
fn matches_target(entry_target: &str, searched: &[String]) -> bool {
    searched
        .iter()
        .all(|t| entry_target.split_whitespace().any(|et| et == t))
}

/// The write-back key encodes the partition as `https://{environment}/{realm}`.
fn split_token_endpoint(token_endpoint: &str) -> Result<(String, String), CacheError> {
    let uri: Uri = token_endpoint
        .parse()
        .map_err(|_| CacheError::StoreError(format!("invalid token endpoint: {token_endpoint}")))?;
    let environment = uri
        .host()
        .ok_or_else(|| {
            CacheError::StoreError(format!("token endpoint without host: {token_endpoint}"))
        })?
        .to_owned();
    let realm = uri.path().trim_matches('/').to_owned();
    Ok((environment, realm))
}
