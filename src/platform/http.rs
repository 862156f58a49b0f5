//! HTTP transport for the imagery platform
//!
//! Provides one client for every platform call with:
//! - Bearer authentication
//! - JSON request/response handling
//! - Retry logic with exponential backoff

use bytes::Bytes;
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::config::PlatformConfig;
use super::{PlatformError, PlatformResult};
use crate::pipeline::config::calculate_backoff;

/// Statuses worth another attempt: rate limiting and server errors
pub(crate) fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Shared HTTP client for platform endpoints
#[derive(Debug, Clone)]
pub struct PlatformHttpClient {
    client: Client,
    config: PlatformConfig,
}

impl PlatformHttpClient {
    /// Build the underlying reqwest client from `config`
    pub fn new(config: PlatformConfig) -> PlatformResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("geotiff-fetcher/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PlatformError::HttpError(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Connection settings in use
    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }

    /// GET `path` and deserialize the JSON body
    pub async fn get_json<T>(&self, path: &str) -> PlatformResult<T>
    where
        T: DeserializeOwned,
    {
        let response = self.send_with_retry(Method::GET, path, None).await?;
        parse_json(response).await
    }

    /// POST a JSON body to `path` and deserialize the JSON response
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> PlatformResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = to_body(body)?;
        let response = self.send_with_retry(Method::POST, path, Some(&body)).await?;
        parse_json(response).await
    }

    /// POST a raster request; `None` when the platform has no data for it
    ///
    /// No data is signalled by `204 No Content`, `404 Not Found` or an empty body.
    pub async fn post_raster<B>(&self, path: &str, body: &B) -> PlatformResult<Option<Bytes>>
    where
        B: Serialize + ?Sized,
    {
        let body = to_body(body)?;
        let response = match self.send_with_retry(Method::POST, path, Some(&body)).await {
            Ok(response) => response,
            Err(PlatformError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| PlatformError::NetworkError(format!("Failed to read raster body: {e}")))?;
        if bytes.is_empty() {
            return Ok(None);
        }
        Ok(Some(bytes))
    }

    /// Execute a request with retry logic and exponential backoff
    ///
    /// Retries on:
    /// - Network errors (timeout, connection refused)
    /// - 5xx server errors
    /// - 429 rate limit errors
    ///
    /// Does not retry on other 4xx client errors. A 404 maps to
    /// [`PlatformError::NotFound`].
    async fn send_with_retry(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> PlatformResult<Response> {
        let url = self.config.url(path);
        let max_retries = self.config.max_retries;
        let mut last_error = None;

        for attempt in 0..=max_retries {
            let mut request = self.client.request(method.clone(), &url);
            if let Some(token) = &self.config.token {
                request = request.bearer_auth(token);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            debug!(method = %method, url = %url, attempt = attempt + 1, "Platform request");

            let response = match request.send().await {
                Ok(resp) => resp,
                Err(e) => {
                    warn!(
                        "Network error on attempt {}/{}: {}",
                        attempt + 1,
                        max_retries + 1,
                        e
                    );
                    last_error = Some(PlatformError::NetworkError(e.to_string()));
                    if attempt < max_retries {
                        let backoff = calculate_backoff(attempt);
                        debug!("Retrying after {:?}", backoff);
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                    break;
                }
            };

            let status = response.status();

            if is_retryable(status) {
                warn!(
                    "Status {} on attempt {}/{}",
                    status,
                    attempt + 1,
                    max_retries + 1
                );
                last_error = Some(if status == StatusCode::TOO_MANY_REQUESTS {
                    PlatformError::RateLimitExceeded
                } else {
                    PlatformError::HttpError(format!("Server error: {status}"))
                });
                if attempt < max_retries {
                    let backoff = calculate_backoff(attempt);
                    debug!("Retrying after {:?}", backoff);
                    tokio::time::sleep(backoff).await;
                    continue;
                }
                break;
            }

            if status == StatusCode::NOT_FOUND {
                return Err(PlatformError::NotFound(path.to_string()));
            }

            if status.is_client_error() {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                return Err(PlatformError::ApiError(format!(
                    "Client error {status}: {error_text}"
                )));
            }

            debug!("Request succeeded on attempt {}", attempt + 1);
            return Ok(response);
        }

        Err(last_error
            .unwrap_or_else(|| PlatformError::NetworkError("All retries exhausted".to_string())))
    }
}

fn to_body<B: Serialize + ?Sized>(body: &B) -> PlatformResult<Value> {
    serde_json::to_value(body)
        .map_err(|e| PlatformError::ParseError(format!("Failed to encode request: {e}")))
}

async fn parse_json<T: DeserializeOwned>(response: Response) -> PlatformResult<T> {
    response
        .json::<T>()
        .await
        .map_err(|e| PlatformError::ParseError(format!("Failed to deserialize response: {e}")))
}
