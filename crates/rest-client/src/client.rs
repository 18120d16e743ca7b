//! Generic REST client wrapper around reqwest.

use crate::error::RestError;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_RETRY_AFTER_MS: u64 = 60_000;

/// HTTP client bound to one base URL.
#[derive(Debug, Clone)]
pub struct RestClient {
    client: Client,
    base_url: String,
}

impl RestClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RestError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RestError::RequestBuild(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a request and decode the JSON body.
    ///
    /// `query` is appended verbatim; signed endpoints need the exact bytes
    /// that were signed.
    pub async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: Option<&str>,
        headers: &[(&str, &str)],
    ) -> Result<T, RestError> {
        let body = self.send_raw(method, path, query, headers).await?;
        serde_json::from_str(&body).map_err(|e| {
            warn!(path = %path, error = %e, "unexpected response body");
            RestError::Parse(e.to_string())
        })
    }

    /// Send a request and discard the body.
    pub async fn send_empty(
        &self,
        method: Method,
        path: &str,
        query: Option<&str>,
        headers: &[(&str, &str)],
    ) -> Result<(), RestError> {
        self.send_raw(method, path, query, headers).await.map(|_| ())
    }

    async fn send_raw(
        &self,
        method: Method,
        path: &str,
        query: Option<&str>,
        headers: &[(&str, &str)],
    ) -> Result<String, RestError> {
        let url = self.build_url(path, query);
        debug!(method = %method, path = %path, "http request");

        let mut request = self.client.request(method, &url);
        for (key, value) in headers {
            request = request.header(*key, *value);
        }

        let response = request.send().await?;
        Self::read_body(response).await
    }

    async fn read_body(response: Response) -> Result<String, RestError> {
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::IM_A_TEAPOT {
            let retry_after_ms = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(|secs| secs * 1000)
                .unwrap_or(DEFAULT_RETRY_AFTER_MS);
            return Err(RestError::RateLimited { retry_after_ms });
        }

        let body = response.text().await?;
        if status.is_success() {
            Ok(body)
        } else {
            Err(RestError::Http {
                status: status.as_u16(),
                body,
            })
        }
    }

    fn build_url(&self, path: &str, query: Option<&str>) -> String {
        match query {
            Some(q) if !q.is_empty() => format!("{}{}?{}", self.base_url, path, q),
            _ => format!("{}{}", self.base_url, path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> RestClient {
        RestClient::new(base, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_build_url() {
        let client = client("https://api.example.com/");
        assert_eq!(client.base_url(), "https://api.example.com");
        assert_eq!(
            client.build_url("/api/v3/order", Some("symbol=BTCUSDT&side=BUY")),
            "https://api.example.com/api/v3/order?symbol=BTCUSDT&side=BUY"
        );
        assert_eq!(
            client.build_url("/api/v3/time", Some("")),
            "https://api.example.com/api/v3/time"
        );
        assert_eq!(
            client.build_url("/api/v3/time", None),
            "https://api.example.com/api/v3/time"
        );
    }
}
