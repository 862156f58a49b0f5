//! Imagery platform client
//!
//! The pipeline talks to the remote platform only through [`ImageryPlatform`],
//! an explicit client handle created once by the driver's owner and passed to
//! every component that needs it. [`client::PlatformClient`] is the HTTP
//! implementation; tests substitute their own.

use crate::{SceneId, TimeRange, Tile};
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::pin::Pin;

pub mod client;
pub mod config;
pub mod http;
pub mod parser;

/// Platform errors
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// HTTP request error
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Network error
    #[error("network error: {0}")]
    NetworkError(String),

    /// Rate limit or quota exceeded
    #[error("rate limit exceeded")]
    RateLimitExceeded,

    /// Error reported by the platform
    #[error("API error: {0}")]
    ApiError(String),

    /// Response parse error
    #[error("parse error: {0}")]
    ParseError(String),

    /// Response did not have the expected shape
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The requested resource does not exist
    #[error("not found: {0}")]
    NotFound(String),
}

/// Result type for platform operations
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Lazy, finite, single-pass sequence of grid tiles
pub type TileStream = Pin<Box<dyn Stream<Item = PlatformResult<Tile>> + Send>>;

/// Catalog search for scene identifiers
///
/// `limit` is always serialized; `null` asks the platform for every match
/// instead of its default page size.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneQuery {
    /// Products to search
    pub products: Vec<String>,
    /// Inclusive start, `YYYY-MM-DDTHH:MM:SS`
    pub start_datetime: Option<String>,
    /// Inclusive end, `YYYY-MM-DDTHH:MM:SS`
    pub end_datetime: Option<String>,
    /// Area to intersect
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geom: Option<Value>,
    /// Tile feature to intersect
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dltile: Option<Value>,
    /// Maximum number of ids; `None` means no limit
    pub limit: Option<usize>,
}

impl SceneQuery {
    /// Unlimited search for one product over a time range
    pub fn new(product_id: &str, time_range: &TimeRange) -> Self {
        Self {
            products: vec![product_id.to_string()],
            start_datetime: time_range.start_param(),
            end_datetime: time_range.end_param(),
            geom: None,
            dltile: None,
            limit: None,
        }
    }

    /// Restrict the search to an area
    pub fn with_geometry(mut self, geometry: Option<Value>) -> Self {
        self.geom = geometry;
        self
    }

    /// Restrict the search to exactly one tile
    pub fn with_tile(mut self, tile: &Tile) -> Self {
        self.dltile = Some(tile.feature.clone());
        self
    }
}

/// Request for the tile grid covering a shape
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TileGridRequest {
    /// Pixel size in meters
    pub resolution: f64,
    /// Tile edge length in pixels
    pub tilesize: u32,
    /// Padding in pixels
    pub pad: u32,
    /// GeoJSON geometry to cover
    pub shape: Value,
}

/// Raster fetch for one or more scenes, optionally clipped to a tile
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RasterRequest {
    /// Scenes to composite
    pub ids: Vec<String>,
    /// Bands to include; all bands when `None`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bands: Option<Vec<String>>,
    /// Tile feature to rasterize over
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dltile: Option<Value>,
    /// Output format
    pub format: &'static str,
}

impl RasterRequest {
    /// GeoTIFF request for `ids`
    pub fn geotiff(ids: Vec<String>, bands: Option<Vec<String>>) -> Self {
        Self {
            ids,
            bands,
            dltile: None,
            format: "GTiff",
        }
    }

    /// Clip to a tile
    pub fn with_tile(mut self, tile: &Tile) -> Self {
        self.dltile = Some(tile.feature.clone());
        self
    }
}

/// Raster payload, or the platform's signal that nothing covers the request
#[derive(Debug, Clone, PartialEq)]
pub enum RasterData {
    /// Encoded GeoTIFF bytes
    Image(Bytes),
    /// No imagery for this request
    Empty,
}

/// Product metadata
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Product {
    /// Product identifier
    pub id: String,
    /// Human readable title
    #[serde(default)]
    pub title: Option<String>,
}

/// Band metadata
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Band {
    /// Band name as used in raster requests
    pub name: String,
}

/// Operations the pipeline needs from the imagery platform
#[async_trait]
pub trait ImageryPlatform: Send + Sync {
    /// Look up a product; [`PlatformError::NotFound`] if it does not exist
    async fn product(&self, product_id: &str) -> PlatformResult<Product>;

    /// Bands of a product
    async fn bands(&self, product_id: &str) -> PlatformResult<Vec<Band>>;

    /// Derived bands available for every product
    async fn derived_bands(&self) -> PlatformResult<Vec<Band>>;

    /// GeoJSON for a named place
    async fn place_shape(&self, slug: &str) -> PlatformResult<Value>;

    /// Scene identifiers matching a query, in catalog order
    async fn search_ids(&self, query: &SceneQuery) -> PlatformResult<Vec<SceneId>>;

    /// Tile grid covering a shape, produced lazily
    async fn tiles_from_shape(&self, request: &TileGridRequest) -> PlatformResult<TileStream>;

    /// Fetch encoded raster data
    async fn raster(&self, request: &RasterRequest) -> PlatformResult<RasterData>;
}
