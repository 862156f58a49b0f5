//! Work unit enumeration
//!
//! Turns an area and time range into the ordered list of units to fetch:
//! catalog scenes, or the tile grid over the area when a tile size is given.

use crate::output::path::raster_file_stem;
use crate::pipeline::PipelineContext;
use crate::platform::{ImageryPlatform, PlatformError, SceneQuery, TileGridRequest};
use crate::WorkUnit;
use futures::StreamExt;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Enumeration errors
#[derive(Debug, thiserror::Error)]
pub enum EnumerateError {
    /// The platform call failed
    #[error("platform error: {0}")]
    Platform(#[from] PlatformError),

    /// Tile mode needs an area of interest
    #[error("tile mode requires an area of interest")]
    MissingArea,

    /// Tile mode needs a resolution
    #[error("tile mode requires a resolution")]
    MissingResolution,
}

/// Lists the work units for a run
pub struct WorkUnitEnumerator {
    platform: Arc<dyn ImageryPlatform>,
    context: Arc<PipelineContext>,
}

impl WorkUnitEnumerator {
    /// Create an enumerator for the run described by `context`
    pub fn new(platform: Arc<dyn ImageryPlatform>, context: Arc<PipelineContext>) -> Self {
        Self { platform, context }
    }

    /// Enumerate scenes, or tiles when `tile_size` is given
    ///
    /// Zero units is a valid answer. Every unit in the result writes its own
    /// file; scenes or tiles the platform reports twice are dropped.
    pub async fn enumerate(
        &self,
        area: Option<&Value>,
        resolution: Option<f64>,
        tile_size: Option<u32>,
    ) -> Result<Vec<WorkUnit>, EnumerateError> {
        let units = match tile_size {
            None => self.enumerate_scenes(area).await?,
            Some(tile_size) => {
                let area = area.ok_or(EnumerateError::MissingArea)?;
                let resolution = resolution.ok_or(EnumerateError::MissingResolution)?;
                self.enumerate_tiles(area, resolution, tile_size).await?
            }
        };

        info!(
            units = units.len(),
            mode = if tile_size.is_some() { "tile" } else { "scene" },
            time_range = %self.context.time_range,
            "Enumerated work units"
        );
        Ok(units)
    }

    async fn enumerate_scenes(&self, area: Option<&Value>) -> Result<Vec<WorkUnit>, EnumerateError> {
        let query = SceneQuery::new(&self.context.product_id, &self.context.time_range)
            .with_geometry(area.cloned());
        let ids = self.platform.search_ids(&query).await?;

        let mut seen = HashSet::new();
        let mut units = Vec::with_capacity(ids.len());
        for id in ids {
            if !seen.insert(raster_file_stem(id.as_str())) {
                warn!(key = %id, "Dropping duplicate scene");
                continue;
            }
            units.push(WorkUnit::Scene(id));
        }
        Ok(units)
    }

    async fn enumerate_tiles(
        &self,
        area: &Value,
        resolution: f64,
        tile_size: u32,
    ) -> Result<Vec<WorkUnit>, EnumerateError> {
        let request = TileGridRequest {
            resolution,
            tilesize: tile_size,
            pad: 0,
            shape: area.clone(),
        };

        // Single pass: the grid stream cannot be restarted
        let mut tiles = self.platform.tiles_from_shape(&request).await?;
        let mut seen = HashSet::new();
        let mut units = Vec::new();
        while let Some(tile) = tiles.next().await {
            let tile = tile?;
            if !seen.insert(raster_file_stem(&tile.key)) {
                warn!(key = %tile.key, "Dropping duplicate tile");
                continue;
            }
            debug!(key = %tile.key, "Tile");
            units.push(WorkUnit::Tile(tile));
        }
        Ok(units)
    }
}
