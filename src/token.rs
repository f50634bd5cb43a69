use std::fmt;

use serde::{Deserialize, Serialize};

pub type AccessToken = String;

pub const DEFAULT_TOKEN_TYPE: &str = "Bearer";

/// Canonical access token record, normalized from either identity endpoint.
///
/// `expires_in` is always a duration relative to the time the token was
/// obtained, even where the upstream endpoint reports an absolute expiry
/// instant. It may be non-positive when the endpoint clock races ours;
/// callers treat that as already-expired, not as an error.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TokenRecord {
    pub access_token: AccessToken,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    /// Proactive-refresh hint: renew this many seconds after issuance even
    /// though the token is still valid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_in: Option<i64>,
}

/// Normalized upstream failure. Returned as data, not raised: the endpoints
/// answer bad requests with an error payload, which is not a transport
/// failure.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ErrorRecord {
    pub error: String,
    pub error_description: String,
}

/// Common return contract for both identity endpoints.
#[derive(Clone, Debug, PartialEq)]
pub enum TokenResponse {
    Token(TokenRecord),
    Error(ErrorRecord),
}

impl TokenResponse {
    pub fn access_token(&self) -> Option<&AccessToken> {
        match self {
            TokenResponse::Token(record) => Some(&record.access_token),
            TokenResponse::Error(_) => None,
        }
    }
}

impl fmt::Display for TokenRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.token_type, self.access_token)
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error, self.error_description)
    }
}
