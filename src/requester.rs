use chrono::Utc;
use http::{HeaderValue, Request};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::endpoint::{AZURE_VM_TOKEN_ENDPOINT, IdentitySource};
use crate::http_client::{HttpClient, HttpClientError};
use crate::identity::ManagedIdentity;
use crate::token::{DEFAULT_TOKEN_TYPE, ErrorRecord, TokenRecord, TokenResponse};

const AZURE_VM_API_VERSION: &str = "2018-02-01";
const APP_SERVICE_API_VERSION: &str = "2019-08-01";

const METADATA_HEADER: &str = "Metadata";
const IDENTITY_HEADER: &str = "X-IDENTITY-HEADER";

#[derive(Error, Debug)]
pub enum RequestTokenError {
    /// The endpoint body was not valid JSON. There is no sensible fallback
    /// for unparsable input, so this propagates as a hard failure.
    #[error("identity endpoint emitted an unexpected payload: `{0}`")]
    MalformedResponse(String),
    #[error("building token request: `{0}`")]
    RequestBuildError(String),
    #[error("http transport error: `{0}`")]
    TransportError(#[from] HttpClientError),
}

/// Issues one token request against the selected identity endpoint and
/// normalizes the two divergent payload shapes into [`TokenResponse`].
///
/// Performs exactly one GET per call and never retries internally; retry is
/// the transport's or the caller's responsibility.
pub struct TokenRequester<C>
where
    C: HttpClient,
{
    http_client: C,
}

impl<C> TokenRequester<C>
where
    C: HttpClient,
{
    pub fn new(http_client: C) -> Self {
        Self { http_client }
    }

    pub fn request_token(
        &self,
        source: &IdentitySource,
        identity: &ManagedIdentity,
        resource: &str,
    ) -> Result<TokenResponse, RequestTokenError> {
        match source {
            IdentitySource::AzureVm => self.request_on_azure_vm(identity, resource),
            IdentitySource::AppService {
                endpoint,
                identity_header,
            } => self.request_on_app_service(endpoint, identity_header, identity, resource),
        }
    }

    fn request_on_azure_vm(
        &self,
        identity: &ManagedIdentity,
        resource: &str,
    ) -> Result<TokenResponse, RequestTokenError> {
        debug!("obtaining token via managed identity on Azure VM");
        let url = format!(
            "{AZURE_VM_TOKEN_ENDPOINT}?{}",
            build_query(AZURE_VM_API_VERSION, resource, identity)
        );
        let request = build_get_request(&url, None)?;

        let response = self.http_client.send(request)?;
        normalize_azure_vm_payload(response.body())
    }

    fn request_on_app_service(
        &self,
        endpoint: &str,
        identity_header: &str,
        identity: &ManagedIdentity,
        resource: &str,
    ) -> Result<TokenResponse, RequestTokenError> {
        debug!("obtaining token via managed identity on Azure App Service");
        let url = format!(
            "{endpoint}?{}",
            build_query(APP_SERVICE_API_VERSION, resource, identity)
        );
        let request = build_get_request(&url, Some(identity_header))?;

        let response = self.http_client.send(request)?;
        normalize_app_service_payload(response.body(), Utc::now().timestamp())
    }
}

fn build_query(api_version: &str, resource: &str, identity: &ManagedIdentity) -> String {
    let mut query = format!(
        "api-version={api_version}&resource={}",
        urlencoding::encode(resource)
    );
    if let Some((name, value)) = identity.wire_param() {
        query.push_str(&format!("&{name}={}", urlencoding::encode(value)));
    }
    query
}

fn build_get_request(
    url: &str,
    identity_header: Option<&str>,
) -> Result<Request<Vec<u8>>, RequestTokenError> {
    let mut builder = Request::builder()
        .method("GET")
        .uri(url)
        .header(METADATA_HEADER, "true");

    if let Some(value) = identity_header {
        let mut header_value = HeaderValue::from_str(value).map_err(|_| {
            RequestTokenError::RequestBuildError(
                "invalid HTTP header value set for X-IDENTITY-HEADER".to_string(),
            )
        })?;
        header_value.set_sensitive(true);
        builder = builder.header(IDENTITY_HEADER, header_value);
    }

    builder
        .body(Vec::new())
        .map_err(|e| RequestTokenError::RequestBuildError(e.to_string()))
}

/// The VM metadata service reports a relative `expires_in` and speaks OAuth2
/// on failure, so error payloads pass through with their own fields.
fn normalize_azure_vm_payload(body: &[u8]) -> Result<TokenResponse, RequestTokenError> {
    let payload = parse_payload(body)?;

    match (non_empty_str(&payload, "access_token"), integer(&payload, "expires_in")) {
        (Some(access_token), Some(expires_in)) => Ok(TokenResponse::Token(TokenRecord {
            access_token: access_token.to_owned(),
            token_type: str_or(&payload, "token_type", DEFAULT_TOKEN_TYPE),
            expires_in,
            resource: non_empty_str(&payload, "resource").map(str::to_owned),
            refresh_in: None,
        })),
        _ => Ok(TokenResponse::Error(ErrorRecord {
            error: str_or(&payload, "error", ""),
            error_description: str_or(&payload, "error_description", ""),
        })),
    }
}

/// The App Service endpoint reports an absolute `expires_on` instant, which
/// is rebased to a relative duration here. It does not emit structured
/// OAuth2 errors on bad resource values, it answers with a vague 500-class
/// `statusCode`/`message` pair instead; that ambiguity is papered over with
/// a fixed `invalid_scope` shape which downstream error handling relies on.
fn normalize_app_service_payload(
    body: &[u8],
    now: i64,
) -> Result<TokenResponse, RequestTokenError> {
    let payload = parse_payload(body)?;

    match (non_empty_str(&payload, "access_token"), integer(&payload, "expires_on")) {
        (Some(access_token), Some(expires_on)) => Ok(TokenResponse::Token(TokenRecord {
            access_token: access_token.to_owned(),
            token_type: str_or(&payload, "token_type", DEFAULT_TOKEN_TYPE),
            // May be non-positive if our clock races the endpoint's.
            expires_in: expires_on - now,
            resource: non_empty_str(&payload, "resource").map(str::to_owned),
            refresh_in: None,
        })),
        _ => Ok(TokenResponse::Error(ErrorRecord {
            error: "invalid_scope".to_string(),
            error_description: format!(
                "{}, {}",
                display_field(&payload, "statusCode"),
                display_field(&payload, "message")
            ),
        })),
    }
}

fn parse_payload(body: &[u8]) -> Result<Value, RequestTokenError> {
    serde_json::from_slice(body).map_err(|e| {
        debug!(
            "identity endpoint emits unexpected payload: {}",
            String::from_utf8_lossy(body)
        );
        RequestTokenError::MalformedResponse(e.to_string())
    })
}

fn non_empty_str<'a>(payload: &'a Value, key: &str) -> Option<&'a str> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Accepts both number-typed and numeric-string values: the endpoints have
/// been observed emitting either for the expiry fields.
fn integer(payload: &Value, key: &str) -> Option<i64> {
    match payload.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn str_or(payload: &Value, key: &str, default: &str) -> String {
    non_empty_str(payload, key)
        .unwrap_or(default)
        .to_owned()
}

fn display_field(payload: &Value, key: &str) -> String {
    match payload.get(key) {
        Some(Value::String(s)) => s.to_owned(),
        Some(value) => value.to_string(),
        None => Value::Null.to_string(),
    }
}

#[cfg(test)]
mod test {
    use assert_matches::assert_matches;
    use http::Response;
    use mockall::predicate::function;
    use rstest::rstest;

    use super::{TokenRequester, normalize_app_service_payload};
    use crate::endpoint::IdentitySource;
    use crate::http_client::tests::MockHttpClient;
    use crate::identity::{ManagedIdentity, UserAssignedId};
    use crate::requester::RequestTokenError;
    use crate::token::{ErrorRecord, TokenRecord, TokenResponse};

    fn json_response(body: &str) -> Response<Vec<u8>> {
        Response::builder()
            .status(200)
            .body(body.as_bytes().to_vec())
            .unwrap()
    }

    fn app_service_source() -> IdentitySource {
        IdentitySource::AppService {
            endpoint: "http://127.0.0.1:8081/msi/token".to_string(),
            identity_header: "header-value".to_string(),
        }
    }

    #[test]
    fn azure_vm_request_shape_and_success() {
        let mut http_client = MockHttpClient::new();
        http_client
            .expect_send()
            .once()
            .withf(|req| {
                req.method() == "GET"
                    && req.uri().host() == Some("169.254.169.254")
                    && req.uri().query()
                        == Some("api-version=2018-02-01&resource=https%3A%2F%2Fvault.azure.net")
                    && req.headers().get("Metadata").is_some_and(|v| v == "true")
                    && req.headers().get("X-IDENTITY-HEADER").is_none()
            })
            .returning(|_| {
                Ok(json_response(
                    r#"{"access_token":"T","expires_in":3600,"resource":"https://vault.azure.net","token_type":"Bearer"}"#,
                ))
            });

        let requester = TokenRequester::new(http_client);
        let response = requester
            .request_token(
                &IdentitySource::AzureVm,
                &ManagedIdentity::SystemAssigned,
                "https://vault.azure.net",
            )
            .unwrap();

        assert_eq!(
            response,
            TokenResponse::Token(TokenRecord {
                access_token: "T".into(),
                token_type: "Bearer".into(),
                expires_in: 3600,
                resource: Some("https://vault.azure.net".into()),
                refresh_in: None,
            })
        );
    }

    #[test]
    fn azure_vm_coerces_string_typed_expiry() {
        let mut http_client = MockHttpClient::new();
        http_client.expect_send().once().returning(|_| {
            Ok(json_response(r#"{"access_token":"T","expires_in":"3600"}"#))
        });

        let requester = TokenRequester::new(http_client);
        let response = requester
            .request_token(
                &IdentitySource::AzureVm,
                &ManagedIdentity::SystemAssigned,
                "https://vault.azure.net",
            )
            .unwrap();

        assert_matches!(response, TokenResponse::Token(record) => {
            assert_eq!(record.expires_in, 3600);
            // The endpoint omitted token_type, so it defaults.
            assert_eq!(record.token_type, "Bearer");
        });
    }

    #[rstest]
    #[case(
        ManagedIdentity::UserAssigned(UserAssignedId::ClientId("c-1".into())),
        "client_id=c-1"
    )]
    #[case(
        ManagedIdentity::UserAssigned(UserAssignedId::ObjectId("o-1".into())),
        "object_id=o-1"
    )]
    #[case(
        ManagedIdentity::UserAssigned(UserAssignedId::ResourceId("r-1".into())),
        "mi_res_id=r-1"
    )]
    fn user_assigned_identity_rides_the_query_string(
        #[case] identity: ManagedIdentity,
        #[case] expected_param: &'static str,
    ) {
        let mut http_client = MockHttpClient::new();
        http_client
            .expect_send()
            .once()
            .with(function(move |req: &http::Request<Vec<u8>>| {
                req.uri()
                    .query()
                    .is_some_and(|q| q.ends_with(expected_param))
            }))
            .returning(|_| Ok(json_response(r#"{"access_token":"T","expires_in":60}"#)));

        let requester = TokenRequester::new(http_client);
        requester
            .request_token(&IdentitySource::AzureVm, &identity, "https://r")
            .unwrap();
    }

    #[test]
    fn azure_vm_error_payload_passes_through() {
        let mut http_client = MockHttpClient::new();
        http_client.expect_send().once().returning(|_| {
            Ok(json_response(
                r#"{"error":"invalid_request","error_description":"Identity not found"}"#,
            ))
        });

        let requester = TokenRequester::new(http_client);
        let response = requester
            .request_token(
                &IdentitySource::AzureVm,
                &ManagedIdentity::SystemAssigned,
                "https://r",
            )
            .unwrap();

        assert_eq!(
            response,
            TokenResponse::Error(ErrorRecord {
                error: "invalid_request".into(),
                error_description: "Identity not found".into(),
            })
        );
    }

    #[test]
    fn non_json_payload_is_a_hard_failure() {
        let mut http_client = MockHttpClient::new();
        http_client
            .expect_send()
            .once()
            .returning(|_| Ok(json_response("<html>proxy interfered</html>")));

        let requester = TokenRequester::new(http_client);
        let error = requester
            .request_token(
                &IdentitySource::AzureVm,
                &ManagedIdentity::SystemAssigned,
                "https://r",
            )
            .unwrap_err();

        assert_matches!(error, RequestTokenError::MalformedResponse(_));
    }

    #[test]
    fn app_service_request_shape_and_expiry_rebasing() {
        let now = chrono::Utc::now().timestamp();
        let expires_on = now + 3600;
        let body = format!(
            r#"{{"access_token":"T","expires_on":{expires_on},"token_type":"Bearer"}}"#
        );

        let mut http_client = MockHttpClient::new();
        http_client
            .expect_send()
            .once()
            .withf(|req| {
                req.uri().to_string().starts_with("http://127.0.0.1:8081/msi/token?")
                    && req.uri().query()
                        == Some("api-version=2019-08-01&resource=https%3A%2F%2Fvault.azure.net")
                    && req
                        .headers()
                        .get("X-IDENTITY-HEADER")
                        .is_some_and(|v| v == "header-value" && v.is_sensitive())
                    && req.headers().get("Metadata").is_some_and(|v| v == "true")
            })
            .returning(move |_| Ok(json_response(&body)));

        let requester = TokenRequester::new(http_client);
        let response = requester
            .request_token(
                &app_service_source(),
                &ManagedIdentity::SystemAssigned,
                "https://vault.azure.net",
            )
            .unwrap();

        assert_matches!(response, TokenResponse::Token(record) => {
            assert_eq!(record.access_token, "T");
            assert_eq!(record.token_type, "Bearer");
            // Tolerate a little skew between building the body and the call.
            assert!((record.expires_in - 3600).abs() <= 2);
        });
    }

    #[test]
    fn app_service_failure_is_synthesized_as_invalid_scope() {
        let mut http_client = MockHttpClient::new();
        http_client.expect_send().once().returning(|_| {
            Ok(json_response(r#"{"statusCode":500,"message":"bad resource"}"#))
        });

        let requester = TokenRequester::new(http_client);
        let response = requester
            .request_token(
                &app_service_source(),
                &ManagedIdentity::SystemAssigned,
                "not-a-resource",
            )
            .unwrap();

        assert_eq!(
            response,
            TokenResponse::Error(ErrorRecord {
                error: "invalid_scope".into(),
                error_description: "500, bad resource".into(),
            })
        );
    }

    #[test]
    fn app_service_failure_with_missing_diagnostics() {
        let response = normalize_app_service_payload(br"{}", 0).unwrap();

        assert_eq!(
            response,
            TokenResponse::Error(ErrorRecord {
                error: "invalid_scope".into(),
                error_description: "null, null".into(),
            })
        );
    }

    #[test]
    fn app_service_expiry_in_the_past_is_not_an_error() {
        let body = br#"{"access_token":"T","expires_on":1000}"#;
        let response = normalize_app_service_payload(body, 4600).unwrap();

        assert_matches!(response, TokenResponse::Token(record) => {
            assert_eq!(record.expires_in, -3600);
        });
    }

    #[test]
    fn transport_error_propagates() {
        let mut http_client = MockHttpClient::new();
        http_client.expect_send().once().returning(|_| {
            Err(crate::http_client::HttpClientError::TransportError(
                "Connection refused".to_string(),
            ))
        });

        let requester = TokenRequester::new(http_client);
        let error = requester
            .request_token(
                &IdentitySource::AzureVm,
                &ManagedIdentity::SystemAssigned,
                "https://r",
            )
            .unwrap_err();

        assert_matches!(error, RequestTokenError::TransportError(_));
        assert!(error.to_string().contains("Connection refused"));
    }
}
