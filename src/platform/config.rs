//! Imagery platform connection settings
//!
//! Endpoint paths are fixed; only the base URL, the token and the retry
//! behaviour vary between deployments.

use crate::pipeline::config::{MAX_RETRIES, REQUEST_TIMEOUT};
use std::time::Duration;

/// Product metadata, `/products/{id}`
pub const PRODUCTS_ENDPOINT: &str = "/products";

/// Derived bands available for every product
pub const DERIVED_BANDS_ENDPOINT: &str = "/bands/derived";

/// Named place shapes, `/places/{slug}/shape`
pub const PLACES_ENDPOINT: &str = "/places";

/// Catalog id search
pub const SEARCH_IDS_ENDPOINT: &str = "/search/ids";

/// Tile grid covering a shape (paged)
pub const TILES_ENDPOINT: &str = "/tiles/from-shape";

/// Raster fetch
pub const RASTER_ENDPOINT: &str = "/raster";

/// Connection settings for [`super::client::PlatformClient`]
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    /// Base URL without a trailing slash
    pub base_url: String,
    /// Bearer token, if the deployment requires one
    pub token: Option<String>,
    /// Timeout applied to every request
    pub request_timeout: Duration,
    /// Retries after the first attempt for retryable failures
    pub max_retries: u32,
}

impl PlatformConfig {
    /// Settings for `base_url` with default timeout and retries
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
            request_timeout: REQUEST_TIMEOUT,
            max_retries: MAX_RETRIES,
        }
    }

    /// Authenticate with a bearer token
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.trim().is_empty());
        self
    }

    /// Override the request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Override the retry count
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Full URL for an endpoint path
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}
