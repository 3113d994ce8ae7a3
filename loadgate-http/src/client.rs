//! HTTP client implementation

use crate::config::HttpConfig;
use crate::errors::HttpError;
use crate::types::{HttpRequest, HttpResponse};
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Client,
};
use std::str::FromStr;
use tracing::{debug, trace};

/// HTTP client trait for making HTTP requests
///
/// The load engine only talks to the network through this trait, so tests
/// can substitute an in-process implementation.
#[async_trait::async_trait]
pub trait HttpClient: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}

/// Pooled reqwest-backed [`HttpClient`]
///
/// The underlying `reqwest::Client` is built once and cloned cheaply, so all
/// concurrent slots share one connection pool.
#[derive(Debug, Clone)]
pub struct HttpManager {
    client: Client,
    config: HttpConfig,
}

impl HttpManager {
    /// Create a new HttpManager with default configuration
    pub fn new() -> Result<Self, HttpError> {
        Self::with_config(HttpConfig::default())
    }

    /// Create a new HttpManager with specific configuration
    pub fn with_config(config: HttpConfig) -> Result<Self, HttpError> {
        debug!(
            "Creating HttpManager with timeout: {}s, pool: {} idle/host",
            config.timeout.as_secs(),
            config.max_idle_per_host
        );

        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(config.max_idle_per_host)
            .pool_idle_timeout(config.idle_timeout)
            .user_agent(&config.user_agent)
            .danger_accept_invalid_certs(!config.verify_ssl)
            .build()
            .map_err(|e| HttpError::ConfigError(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }
}

#[async_trait::async_trait]
impl HttpClient for HttpManager {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let url = reqwest::Url::parse(&request.url)
            .map_err(|e| HttpError::InvalidUrl(format!("{}: {}", request.url, e)))?;

        trace!("Building {} request to {}", request.method, url);
        let mut builder = self.client.request(request.method.into(), url);

        if !request.headers.is_empty() {
            let mut header_map = HeaderMap::new();
            for (key, value) in &request.headers {
                let header_name = HeaderName::from_str(key)
                    .map_err(|_| HttpError::InvalidHeaderName(key.to_string()))?;
                if let Ok(header_value) = HeaderValue::from_str(value) {
                    header_map.insert(header_name, header_value);
                }
            }
            builder = builder.headers(header_map);
        }

        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| self.classify(e))?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| self.classify(e))?;

        trace!("HTTP response received: {} ({} bytes)", status, body.len());
        Ok(HttpResponse::new(status, body.to_vec()))
    }
}

impl HttpManager {
    fn classify(&self, error: reqwest::Error) -> HttpError {
        if error.is_timeout() {
            HttpError::Timeout(self.config.timeout)
        } else {
            HttpError::NetworkError(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_post_json_reaches_server_with_content_type() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/evaluate"))
            .and(header("content-type", "application/json"))
            .and(body_json(serde_json::json!({"decisionKey": "loan"})))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"outputs":[1]}"#))
            .expect(1)
            .mount(&mock_server)
            .await;

        let manager = HttpManager::new().unwrap();
        let request = HttpRequest::post_json(
            format!("{}/api/v1/evaluate", mock_server.uri()),
            br#"{"decisionKey":"loan"}"#.to_vec(),
        );

        let response = manager.send(request).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, br#"{"outputs":[1]}"#.to_vec());
    }

    #[tokio::test]
    async fn test_non_success_status_is_not_an_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/definitions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&mock_server)
            .await;

        let manager = HttpManager::new().unwrap();
        let response = manager
            .send(HttpRequest::get(format!("{}/api/v1/definitions", mock_server.uri())))
            .await
            .unwrap();

        assert_eq!(response.status, 503);
        assert_eq!(response.body, b"unavailable".to_vec());
    }

    #[tokio::test]
    async fn test_timeout_is_classified() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&mock_server)
            .await;

        let config = HttpConfig {
            timeout: Duration::from_millis(200),
            ..Default::default()
        };
        let manager = HttpManager::with_config(config).unwrap();
        let err = manager
            .send(HttpRequest::get(format!("{}/slow", mock_server.uri())))
            .await
            .unwrap_err();

        assert!(matches!(err, HttpError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let manager = HttpManager::new().unwrap();
        let err = manager.send(HttpRequest::get("not a url")).await.unwrap_err();
        assert!(matches!(err, HttpError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        let manager = HttpManager::new().unwrap();
        // Port 9 (discard) is closed on any sane test host
        let err = manager
            .send(HttpRequest::get("http://127.0.0.1:9/api/v1/definitions"))
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::NetworkError(_)));
    }
}
