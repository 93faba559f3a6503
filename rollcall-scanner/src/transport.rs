use crate::dispatch::ApiRequest;
use crate::error::{Result, ScanError};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

/// Executes a built request against the target platform.
///
/// Implementations resolve to the decoded JSON body on a 2xx response,
/// `ScanError::RateLimited` on 429, `ScanError::HttpStatus` for any other
/// status and `ScanError::Transport` for network failures. They never retry.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: &ApiRequest) -> Result<Value>;
}

/// Headers every request carries before the configured ones are applied.
const BASELINE_HEADERS: [(&str, &str); 4] = [
    ("accept", "application/json, text/plain, */*"),
    ("accept-language", "en-GB,en-US;q=0.9,en;q=0.8"),
    ("cache-control", "no-cache"),
    ("pragma", "no-cache"),
];

pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        Self::with_timeout(30)
    }

    pub fn with_timeout(timeout_secs: u64) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        for (name, value) in BASELINE_HEADERS {
            default_headers.insert(name, HeaderValue::from_static(value));
        }

        let client = Client::builder()
            .user_agent(concat!("Rollcall/", env!("CARGO_PKG_VERSION")))
            .default_headers(default_headers)
            .cookie_store(true)
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs((timeout_secs / 2).max(1)))
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| ScanError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: &ApiRequest) -> Result<Value> {
        let url = Url::parse(&request.url)
            .map_err(|e| ScanError::InvalidRequest(format!("invalid URL '{}': {}", request.url, e)))?;

        let mut headers = HeaderMap::new();
        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ScanError::InvalidRequest(format!("header '{}': {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ScanError::InvalidRequest(format!("header value for '{}': {}", name, e)))?;
            headers.insert(name, value);
        }

        let mut builder = self
            .client
            .request(request.method.clone(), url)
            .headers(headers);
        if let Some(body) = &request.body {
            builder = builder.body(serde_json::to_vec(body)?);
        }

        let start = Instant::now();
        let response = builder.send().await?;
        let status = response.status();
        debug!(
            url = %request.url,
            status = status.as_u16(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "API response"
        );

        if status.as_u16() == 429 {
            warn!(url = %request.url, "rate limited");
            return Err(ScanError::RateLimited);
        }
        if !status.is_success() {
            return Err(ScanError::HttpStatus(status.as_u16()));
        }

        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| ScanError::Transport(format!("response was not valid JSON: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Method;
    use serde_json::json;
    use std::collections::BTreeMap;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_json, header, method, path, query_param},
    };

    fn get_request(url: String) -> ApiRequest {
        ApiRequest {
            url,
            method: Method::GET,
            headers: BTreeMap::new(),
            body: None,
        }
    }

    #[tokio::test]
    async fn test_success_returns_json_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/user/getById"))
            .and(query_param("userId", "42"))
            .and(header("pragma", "no-cache"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"userId": "42"})))
            .mount(&mock_server)
            .await;

        let transport = HttpTransport::new().unwrap();
        let url = format!("{}/api/user/getById?userId=42&eventPath=x", mock_server.uri());
        let body = transport.execute(&get_request(url)).await.unwrap();

        assert_eq!(body, json!({"userId": "42"}));
    }

    #[tokio::test]
    async fn test_429_is_rate_limited() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&mock_server)
            .await;

        let transport = HttpTransport::new().unwrap();
        let err = transport.execute(&get_request(mock_server.uri())).await.unwrap_err();

        assert!(matches!(err, ScanError::RateLimited));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_other_status_is_http_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let transport = HttpTransport::new().unwrap();
        let err = transport.execute(&get_request(mock_server.uri())).await.unwrap_err();

        assert!(matches!(err, ScanError::HttpStatus(503)));
        assert_eq!(err.to_string(), "HTTP_503");
    }

    #[tokio::test]
    async fn test_post_sends_headers_and_body() {
        let mock_server = MockServer::start().await;
        let payload = json!([{"operationName": "EventPersonDetailsQuery"}]);
        Mock::given(method("POST"))
            .and(path("/api/graphql"))
            .and(header("authorization", "Bearer abc"))
            .and(body_json(payload.clone()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"data": {}}])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let mut headers = BTreeMap::new();
        headers.insert("authorization".to_string(), "Bearer abc".to_string());
        headers.insert("content-type".to_string(), "application/json".to_string());
        let request = ApiRequest {
            url: format!("{}/api/graphql", mock_server.uri()),
            method: Method::POST,
            headers,
            body: Some(payload),
        };

        let transport = HttpTransport::new().unwrap();
        transport.execute(&request).await.unwrap();
    }

    #[tokio::test]
    async fn test_non_json_body_is_transport_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
            .mount(&mock_server)
            .await;

        let transport = HttpTransport::new().unwrap();
        let err = transport.execute(&get_request(mock_server.uri())).await.unwrap_err();
        assert!(matches!(err, ScanError::Transport(_)));
    }

    #[tokio::test]
    async fn test_invalid_url_is_not_retryable() {
        let transport = HttpTransport::new().unwrap();
        let err = transport
            .execute(&get_request("not a url".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::InvalidRequest(_)));
        assert!(!err.is_retryable());
    }
}
