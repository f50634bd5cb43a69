pub mod auth_scheme;
pub mod cache;
pub mod client;
pub mod endpoint;
pub mod http;
pub mod http_client;
pub mod identity;
pub mod parameters;
pub mod requester;
pub mod resource;
pub mod token;

use crate::token::TokenResponse;
use thiserror::Error;

pub type ClientID = String;

#[derive(Error, Debug)]
pub enum AcquireTokenError {
    #[error("requesting token from identity endpoint: `{0}`")]
    RequestError(#[from] requester::RequestTokenError),
    #[error("accessing token cache: `{0}`")]
    CacheError(#[from] cache::CacheError),
}

/// The TokenAcquirer will be the responsible to acquire an access token
/// for a target resource, from cache or from the identity endpoint.
pub trait TokenAcquirer {
    fn acquire_token(&self, resource: &str) -> Result<TokenResponse, AcquireTokenError>;
}
