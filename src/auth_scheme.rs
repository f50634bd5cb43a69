use http::Uri;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum AuthSchemeError {
    #[error("http_method, url and nonce are all required parameters")]
    MissingParameter,
    #[error("http_method must be uppercase: `{0}`")]
    LowercaseMethod(String),
    #[error("invalid url to sign: `{0}`")]
    InvalidUrl(String),
}

/// Parameters binding a proof-of-possession token to one signed HTTP
/// request context. This only validates the inputs; signature construction
/// belongs to the request layer.
#[derive(Debug, Clone, PartialEq)]
pub struct PopAuthScheme {
    http_method: String,
    url: Uri,
    nonce: String,
}

impl PopAuthScheme {
    /// `http_method` is an uppercase verb such as "GET" or "POST", `url` the
    /// url to be signed, `nonce` the value from the resource's challenge.
    pub fn new(http_method: &str, url: &str, nonce: &str) -> Result<Self, AuthSchemeError> {
        if http_method.is_empty() || url.is_empty() || nonce.is_empty() {
            return Err(AuthSchemeError::MissingParameter);
        }
        if http_method.to_uppercase() != http_method {
            return Err(AuthSchemeError::LowercaseMethod(http_method.to_owned()));
        }
        let url = url
            .parse::<Uri>()
            .map_err(|e| AuthSchemeError::InvalidUrl(e.to_string()))?;
        Ok(Self {
            http_method: http_method.to_owned(),
            url,
            nonce: nonce.to_owned(),
        })
    }

    pub fn http_method(&self) -> &str {
        &self.http_method
    }

    pub fn url(&self) -> &Uri {
        &self.url
    }

    pub fn nonce(&self) -> &str {
        &self.nonce
    }
}
