use crate::http_client::{HttpClient as MiHttpClient, HttpClientError as MiHttpClientError};
use crate::parameters::DEFAULT_REQUEST_TIMEOUT;
use http::{Request, Response};
use reqwest::blocking::{Client, Response as BlockingResponse};

/// `reqwest`-backed transport for the identity endpoints.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new() -> Result<Self, HttpBuildError> {
        let builder = Client::builder()
            .use_rustls_tls()
            .tls_built_in_native_certs(true)
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .connect_timeout(DEFAULT_REQUEST_TIMEOUT);

        let client = builder
            .build()
            .map_err(|err| HttpBuildError::ClientBuilder(err.to_string()))?;

        Ok(Self { client })
    }

    fn dispatch(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>, HttpResponseError> {
        let req = self
            .client
            .request(request.method().into(), request.uri().to_string().as_str())
            .headers(request.headers().clone())
            .body(request.body().to_vec());

        let res = req
            .send()
            .map_err(|err| HttpResponseError::TransportError(err.to_string()))?;

        try_build_response(res)
    }
}

fn try_build_response(res: BlockingResponse) -> Result<Response<Vec<u8>>, HttpResponseError> {
    let status = res.status();
    let version = res.version();

    let body: Vec<u8> = res
        .bytes()
        .map_err(|err| HttpResponseError::ReadingResponse(err.to_string()))?
        .into();

    http::Response::builder()
        .status(status)
        .version(version)
        .body(body)
        .map_err(|err| HttpResponseError::BuildingResponse(err.to_string()))
}

impl MiHttpClient for HttpClient {
    fn send(&self, req: Request<Vec<u8>>) -> Result<Response<Vec<u8>>, MiHttpClientError> {
        let response = self.dispatch(req)?;

        Ok(response)
    }
}

impl From<HttpResponseError> for MiHttpClientError {
    fn from(err: HttpResponseError) -> Self {
        match err {
            HttpResponseError::TransportError(msg) => MiHttpClientError::TransportError(msg),
            HttpResponseError::BuildingResponse(msg) | HttpResponseError::ReadingResponse(msg) => {
                MiHttpClientError::InvalidResponse(msg)
            }
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum HttpBuildError {
    #[error("could not build the http client: {0}")]
    ClientBuilder(String),
}

#[derive(thiserror::Error, Debug)]
enum HttpResponseError {
    #[error("could read response body: {0}")]
    ReadingResponse(String),
    #[error("could build response: {0}")]
    BuildingResponse(String),
    #[error("http transport error: `{0}`")]
    TransportError(String),
}

#[cfg(test)]
mod tests {
    use super::HttpClient;
    use crate::http_client::HttpClient as _;
    use httpmock::{Method::GET, MockServer};

    #[test]
    fn get_with_query_and_headers() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/metadata/identity/oauth2/token")
                .query_param("resource", "res-1")
                .header("Metadata", "true");
            then.status(200).body(r#"{"access_token":"T"}"#);
        });

        let client = HttpClient::new().unwrap();
        let request = http::Request::builder()
            .method("GET")
            .uri(server.url("/metadata/identity/oauth2/token?resource=res-1"))
            .header("Metadata", "true")
            .body(Vec::new())
            .unwrap();

        let response = client.send(request).unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(response.body(), br#"{"access_token":"T"}"#);
        mock.assert();
    }

    #[test]
    fn connection_error_is_a_transport_error() {
        // Port 9 (discard) is expected to refuse connections.
        let client = HttpClient::new().unwrap();
        let request = http::Request::builder()
            .method("GET")
            .uri("http://127.0.0.1:9/token")
            .body(Vec::new())
            .unwrap();

        let error = client.send(request).unwrap_err();

        assert!(matches!(
            error,
            crate::http_client::HttpClientError::TransportError(_)
        ));
    }
}
