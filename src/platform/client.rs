//! HTTP implementation of [`ImageryPlatform`]

use super::config::{
    PlatformConfig, DERIVED_BANDS_ENDPOINT, PLACES_ENDPOINT, PRODUCTS_ENDPOINT, RASTER_ENDPOINT,
    SEARCH_IDS_ENDPOINT, TILES_ENDPOINT,
};
use super::http::PlatformHttpClient;
use super::parser::{PlatformParser, TilePage};
use super::{
    Band, ImageryPlatform, PlatformError, PlatformResult, Product, RasterData, RasterRequest,
    SceneQuery, TileGridRequest, TileStream,
};
use crate::{SceneId, Tile};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// Tile grid request plus the page to fetch
#[derive(Serialize)]
struct TilePageRequest<'a> {
    #[serde(flatten)]
    grid: &'a TileGridRequest,
    #[serde(skip_serializing_if = "Option::is_none")]
    page_token: Option<String>,
}

/// Imagery platform reached over HTTP
#[derive(Debug, Clone)]
pub struct PlatformClient {
    http: PlatformHttpClient,
}

impl PlatformClient {
    /// Create a client for the platform described by `config`
    pub fn new(config: PlatformConfig) -> PlatformResult<Self> {
        Ok(Self {
            http: PlatformHttpClient::new(config)?,
        })
    }

    /// Fetch one page of the tile grid
    async fn fetch_tile_page(
        &self,
        grid: &TileGridRequest,
        page_token: Option<String>,
    ) -> PlatformResult<TilePage> {
        let body = TilePageRequest { grid, page_token };
        let page: Value = self.http.post_json(TILES_ENDPOINT, &body).await?;
        PlatformParser::parse_tile_page(page)
    }
}

/// Lazily page through the tile grid
///
/// `first` is yielded without a fetch. Each later page is requested with the
/// previous page's token, only once the stream is polled past the tiles
/// already received. The stream ends after a page without a token, or right
/// after the first error.
pub(crate) fn paged_tiles<F, Fut>(first: TilePage, fetch_page: F) -> TileStream
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = PlatformResult<TilePage>> + Send + 'static,
{
    let fetch_page = Arc::new(fetch_page);
    let stream = stream::unfold(
        (Some(first), None::<String>),
        move |(pending, token)| {
            let fetch_page = fetch_page.clone();

            async move {
                let page = match (pending, token) {
                    (Some(page), _) => page,
                    (None, Some(token)) => match fetch_page(token).await {
                        Ok(page) => page,
                        Err(e) => {
                            let items: Vec<PlatformResult<Tile>> = vec![Err(e)];
                            return Some((stream::iter(items), (None, None)));
                        }
                    },
                    (None, None) => return None,
                };

                let next = page.next_page_token;
                let items: Vec<PlatformResult<Tile>> = page.tiles.into_iter().map(Ok).collect();
                Some((stream::iter(items), (None, next)))
            }
        },
    )
    .flatten();

    Box::pin(stream)
}

#[async_trait]
impl ImageryPlatform for PlatformClient {
    async fn product(&self, product_id: &str) -> PlatformResult<Product> {
        let path = format!("{PRODUCTS_ENDPOINT}/{}", urlencoding::encode(product_id));
        self.http.get_json(&path).await.map_err(|e| match e {
            PlatformError::NotFound(_) => PlatformError::NotFound(format!("product {product_id}")),
            other => other,
        })
    }

    async fn bands(&self, product_id: &str) -> PlatformResult<Vec<Band>> {
        let path = format!("{PRODUCTS_ENDPOINT}/{}/bands", urlencoding::encode(product_id));
        self.http.get_json(&path).await
    }

    async fn derived_bands(&self) -> PlatformResult<Vec<Band>> {
        self.http.get_json(DERIVED_BANDS_ENDPOINT).await
    }

    async fn place_shape(&self, slug: &str) -> PlatformResult<Value> {
        let path = format!("{PLACES_ENDPOINT}/{}/shape", urlencoding::encode(slug));
        self.http.get_json(&path).await.map_err(|e| match e {
            PlatformError::NotFound(_) => PlatformError::NotFound(format!("place {slug}")),
            other => other,
        })
    }

    async fn search_ids(&self, query: &SceneQuery) -> PlatformResult<Vec<SceneId>> {
        let response: Value = self.http.post_json(SEARCH_IDS_ENDPOINT, query).await?;
        let ids = PlatformParser::parse_scene_ids(response)?;
        debug!(count = ids.len(), "Catalog search returned ids");
        Ok(ids)
    }

    async fn tiles_from_shape(&self, request: &TileGridRequest) -> PlatformResult<TileStream> {
        // The first page is fetched eagerly so a bad request fails here
        let first = self.fetch_tile_page(request, None).await?;

        let client = self.clone();
        let grid = request.clone();
        Ok(paged_tiles(first, move |token| {
            let client = client.clone();
            let grid = grid.clone();
            async move {
                debug!(page_token = %token, "Fetching next tile page");
                client.fetch_tile_page(&grid, Some(token)).await
            }
        }))
    }

    async fn raster(&self, request: &RasterRequest) -> PlatformResult<RasterData> {
        match self.http.post_raster(RASTER_ENDPOINT, request).await? {
            Some(bytes) => Ok(RasterData::Image(bytes)),
            None => Ok(RasterData::Empty),
        }
    }
}
