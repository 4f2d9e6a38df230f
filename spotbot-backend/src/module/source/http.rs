///! Shared HTTP client for the polled providers
use super::FetchError;
use crate::config::HttpConfig;
use anyhow::Context;
use reqwest::header::ACCEPT;
use serde_json::Value;
use std::time::Duration;

pub struct HttpFetcher {
    client: reqwest::Client,
    max_attempts: u32,
    backoff_base: Duration,
}

impl HttpFetcher {
    pub fn new(config: &HttpConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            max_attempts: config.max_attempts.max(1),
            backoff_base: config.backoff_base(),
        })
    }

    /// GET a JSON array, one `Value` per element
    pub async fn get_json_array(&self, url: &str) -> Result<Vec<Value>, FetchError> {
        let body = self.get_text(url, "application/json").await?;
        serde_json::from_str::<Vec<Value>>(&body).map_err(|e| FetchError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    /// GET with bounded retries on connection errors and 500/502/504.
    /// Delay before attempt n+1 is `base * 2^(n-1)`.
    pub async fn get_text(&self, url: &str, accept: &str) -> Result<String, FetchError> {
        let mut attempt = 1;
        loop {
            match self.fetch_attempt(url, accept).await {
                Ok(body) => {
                    tracing::debug!("Fetched {} bytes from {} (attempt {})", body.len(), url, attempt);
                    return Ok(body);
                }
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.backoff_base * 2u32.saturating_pow(attempt - 1);
                    tracing::warn!(
                        "Attempt {}/{} failed for {}: {}. Retrying in {:?}...",
                        attempt,
                        self.max_attempts,
                        url,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!("Failed to fetch {} after {} attempts: {}", url, attempt, e);
                    return Err(e);
                }
            }
        }
    }

    /// Single fetch attempt
    async fn fetch_attempt(&self, url: &str, accept: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT, accept)
            .send()
            .await
            .map_err(|e| FetchError::Transport {
                url: url.to_string(),
                message: e.without_url().to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(|e| FetchError::Transport {
            url: url.to_string(),
            message: e.without_url().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(&HttpConfig {
            backoff_base_millis: 10,
            ..HttpConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_retries_server_errors_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/spots"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/spots"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"[{"a":1},{"a":2}]"#))
            .mount(&server)
            .await;

        let items = fetcher()
            .get_json_array(&format!("{}/spots", server.uri()))
            .await
            .unwrap();
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_three_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(504))
            .expect(3)
            .mount(&server)
            .await;

        let err = fetcher()
            .get_json_array(&format!("{}/spots", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 504, .. }));
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let err = fetcher()
            .get_json_array(&format!("{}/spots", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_malformed_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .expect(1)
            .mount(&server)
            .await;

        let err = fetcher()
            .get_json_array(&format!("{}/spots", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let err = fetcher()
            .get_json_array("http://127.0.0.1:9/spots")
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Transport { .. }));
    }
}
