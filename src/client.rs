use std::env;

use chrono::Utc;
use tracing::debug;

use crate::cache::{
    self, CacheAddition, CacheDecision, CacheQuery, InMemoryTokenCache, TokenCache,
};
use crate::endpoint::IdentitySource;
use crate::http_client::HttpClient;
use crate::identity::ManagedIdentity;
use crate::requester::TokenRequester;
use crate::token::{TokenRecord, TokenResponse};
use crate::{AcquireTokenError, TokenAcquirer};

/// Realm placeholder for the cache partition of managed-identity entries.
const CACHE_REALM: &str = "managed_identity";
/// Tokens living at least this long get a proactive-refresh hint at half
/// their lifetime.
const REFRESH_HINT_THRESHOLD_SECS: i64 = 7200;

/// Acquires tokens for one managed identity, consulting the cache before
/// going to the platform identity endpoint.
///
/// Every acquisition performs at most one network round trip, one cache
/// read and one cache write. Concurrent callers racing a cold cache each
/// hit the network independently; the identity endpoints are idempotent.
pub struct ManagedIdentityClient<C, T>
where
    C: HttpClient,
    T: TokenCache,
{
    identity: ManagedIdentity,
    requester: TokenRequester<C>,
    token_cache: T,
    /// Host identity placeholder partitioning the cache. Not security
    /// sensitive; captured once at construction.
    instance: String,
}

impl<C> ManagedIdentityClient<C, InMemoryTokenCache>
where
    C: HttpClient,
{
    pub fn new(identity: ManagedIdentity, http_client: C) -> Self {
        Self {
            identity,
            requester: TokenRequester::new(http_client),
            token_cache: InMemoryTokenCache::default(),
            instance: host_instance(),
        }
    }
}

impl<C, T> ManagedIdentityClient<C, T>
where
    C: HttpClient,
    T: TokenCache,
{
    /// Replaces the default in-memory store with an injected cache store.
    pub fn with_token_cache<T2>(self, token_cache: T2) -> ManagedIdentityClient<C, T2>
    where
        T2: TokenCache,
    {
        ManagedIdentityClient {
            identity: self.identity,
            requester: self.requester,
            token_cache,
            instance: self.instance,
        }
    }

    fn cache_query(&self) -> CacheQuery {
        CacheQuery {
            client_id: self.identity.cache_client_id().map(str::to_owned),
            environment: self.instance.clone(),
            realm: CACHE_REALM.to_owned(),
            home_account_id: None,
        }
    }
}

impl<C, T> TokenAcquirer for ManagedIdentityClient<C, T>
where
    C: HttpClient,
    T: TokenCache,
{
    fn acquire_token(&self, resource: &str) -> Result<TokenResponse, AcquireTokenError> {
        let decision = cache::lookup(&self.token_cache, resource, &self.cache_query(), Utc::now())?;
        let fallback = match decision {
            CacheDecision::Fresh(record) => return Ok(TokenResponse::Token(record)),
            CacheDecision::Aging(record) => Some(record),
            CacheDecision::Miss => None,
        };

        // Selected fresh on every call; the signals are stable but cheap to read.
        let source = IdentitySource::detect();
        match self.requester.request_token(&source, &self.identity, resource) {
            Ok(TokenResponse::Token(record)) => {
                let record = with_refresh_hint(record);
                self.token_cache.add(CacheAddition {
                    client_id: self.identity.cache_client_id().map(str::to_owned),
                    scope: vec![resource.to_owned()],
                    token_endpoint: format!("https://{}/{CACHE_REALM}", self.instance),
                    response: record.clone(),
                })?;
                debug!("access token refreshed from the identity endpoint");
                Ok(TokenResponse::Token(record))
            }
            Ok(TokenResponse::Error(error)) => match fallback {
                Some(record) => {
                    // Stale-but-valid beats no token.
                    debug!("identity endpoint answered `{error}`, serving the aging cached token");
                    Ok(TokenResponse::Token(record))
                }
                None => Ok(TokenResponse::Error(error)),
            },
            Err(e) => match fallback {
                Some(record) => {
                    debug!("error refreshing token: {e}, serving the aging cached token");
                    Ok(TokenResponse::Token(record))
                }
                None => Err(e.into()),
            },
        }
    }
}

fn with_refresh_hint(record: TokenRecord) -> TokenRecord {
    if record.refresh_in.is_none() && record.expires_in >= REFRESH_HINT_THRESHOLD_SECS {
        return TokenRecord {
            refresh_in: Some(record.expires_in / 2),
            ..record
        };
    }
    record
}

fn host_instance() -> String {
    env::var("HOSTNAME").unwrap_or_else(|_| String::from("localhost"))
}
