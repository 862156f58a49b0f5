//! Fetch one work unit into one raster file

use crate::output::path::{raster_file_stem, raster_path_for_prefix};
use crate::pipeline::PipelineContext;
use crate::platform::{ImageryPlatform, PlatformError, RasterData, RasterRequest, SceneQuery};
use crate::{FetchRequest, FetchResult, Tile, WorkUnit};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Raster fetch errors
#[derive(Debug, thiserror::Error)]
pub enum RasterizeError {
    /// The platform call failed
    #[error("fetch error: {0}")]
    Fetch(#[from] PlatformError),

    /// The platform returned nothing for a scene id it listed
    #[error("no raster returned for scene {0}")]
    MissingScene(String),

    /// The payload is not a GeoTIFF
    #[error("invalid raster: {0}")]
    InvalidRaster(String),

    /// The raster could not be written
    #[error("IO error: {0}")]
    Io(String),
}

/// Whether `bytes` start with a little- or big-endian TIFF signature
pub fn is_tiff(bytes: &[u8]) -> bool {
    bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*")
}

/// Fetches work units into the run's working directory
///
/// Cheap to clone; every clone shares the same platform client and context.
#[derive(Clone)]
pub struct Rasterizer {
    platform: Arc<dyn ImageryPlatform>,
    context: Arc<PipelineContext>,
    work_dir: Arc<PathBuf>,
}

impl Rasterizer {
    /// Create a rasterizer writing into `work_dir`
    pub fn new(
        platform: Arc<dyn ImageryPlatform>,
        context: Arc<PipelineContext>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            platform,
            context,
            work_dir: Arc::new(work_dir.into()),
        }
    }

    /// Directory rasters are written to
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// The fetch request for `unit` under this run's settings
    pub fn request_for(&self, unit: WorkUnit) -> FetchRequest {
        let output_prefix = self.work_dir.join(raster_file_stem(unit.key()));
        FetchRequest {
            unit,
            product_id: self.context.product_id.clone(),
            bands: self.context.bands.clone(),
            time_range: self.context.time_range,
            output_prefix,
        }
    }

    /// Fetch `unit` and write it to `<output_prefix>.tif`
    ///
    /// A tile with no matching scenes, or no imagery, is reported as
    /// [`FetchResult::no_data`]. A scene without imagery is an error.
    pub async fn rasterize(&self, unit: WorkUnit) -> Result<FetchResult, RasterizeError> {
        let request = self.request_for(unit);
        let key = request.unit.key().to_string();

        let data = match &request.unit {
            WorkUnit::Scene(id) => {
                let raster = RasterRequest::geotiff(vec![id.to_string()], request.bands.clone());
                match self.platform.raster(&raster).await? {
                    RasterData::Image(bytes) => bytes,
                    RasterData::Empty => return Err(RasterizeError::MissingScene(key)),
                }
            }
            WorkUnit::Tile(tile) => match self.fetch_tile(&request, tile).await? {
                Some(bytes) => bytes,
                None => return Ok(FetchResult::no_data(key)),
            },
        };

        if !is_tiff(&data) {
            return Err(RasterizeError::InvalidRaster(format!(
                "response for {key} is not a GeoTIFF ({} bytes)",
                data.len()
            )));
        }

        let path = raster_path_for_prefix(&request.output_prefix);
        write_atomic(&path, &data).await?;
        info!(key = %key, path = %path.display(), bytes = data.len(), "Wrote raster");
        Ok(FetchResult::written(key, path))
    }

    async fn fetch_tile(
        &self,
        request: &FetchRequest,
        tile: &Tile,
    ) -> Result<Option<Bytes>, RasterizeError> {
        let query = SceneQuery::new(&request.product_id, &request.time_range).with_tile(tile);
        let ids = self.platform.search_ids(&query).await?;
        if ids.is_empty() {
            debug!(key = %tile.key, "No scenes intersect tile");
            return Ok(None);
        }

        let ids = ids.into_iter().map(|id| id.to_string()).collect();
        let raster = RasterRequest::geotiff(ids, request.bands.clone()).with_tile(tile);
        match self.platform.raster(&raster).await? {
            RasterData::Image(bytes) => Ok(Some(bytes)),
            RasterData::Empty => {
                debug!(key = %tile.key, "No imagery for tile");
                Ok(None)
            }
        }
    }
}

async fn write_atomic(path: &Path, data: &[u8]) -> Result<(), RasterizeError> {
    let partial = path.with_extension("tif.part");
    tokio::fs::write(&partial, data)
        .await
        .map_err(|e| RasterizeError::Io(format!("Failed to write {}: {e}", partial.display())))?;
    tokio::fs::rename(&partial, path)
        .await
        .map_err(|e| RasterizeError::Io(format!("Failed to move {}: {e}", path.display())))
}
