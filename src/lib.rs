//! # GeoTIFF Fetcher Library
//!
//! Fetches satellite imagery from a remote imagery platform for a time range and
//! area of interest, and turns it into a single GeoTIFF with the GDAL tools.
//!
//! ## Features
//!
//! - **Scene or tile mode**: fetch whole catalog scenes, or a regular tile grid
//!   covering the area of interest
//! - **Bounded parallelism**: fetches fan out over a fixed number of workers and
//!   one failing unit never cancels its siblings
//! - **Deterministic output**: every unit lands under a name derived from its key,
//!   and the mosaic step consumes an explicit manifest
//! - **Post-processing**: optional resample, cutline clip and reprojection
//! - **Upload**: optional copy to a `gs://` bucket
//!
//! ## Quick Start
//!
//! ```no_run
//! use geotiff_fetcher::pipeline::{PipelineContext, PipelineDriver};
//! use geotiff_fetcher::platform::client::PlatformClient;
//! use geotiff_fetcher::platform::config::PlatformConfig;
//! use geotiff_fetcher::tools::ProcessRunner;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let platform = Arc::new(PlatformClient::new(PlatformConfig::new("https://imagery.example.com/v1"))?);
//! let context = PipelineContext::new("landsat:LC08:01:RT:TOAR", "/data/out.tif");
//!
//! let mut driver = PipelineDriver::new(Arc::new(context), platform, Arc::new(ProcessRunner::new()));
//! let report = driver.run().await?;
//! println!("wrote {}", report.output_path.display());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`platform`] - Imagery platform client (catalog search, tile grid, raster fetch)
//! - [`pipeline`] - Enumeration, rasterization, dispatch and the stage driver
//! - [`output`] - Raster file naming and the mosaic manifest
//! - [`tools`] - External GDAL command execution
//! - [`storage`] - Cloud bucket upload
//! - [`cli`] - Command line surface and input validation

#![warn(missing_docs)]
#![warn(clippy::all)]

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};

/// Command line surface and input validation
pub mod cli;

/// Raster naming and manifest output
pub mod output;

/// Retrieval pipeline and stage driver
pub mod pipeline;

/// Imagery platform client
pub mod platform;

/// Cloud bucket upload
pub mod storage;

/// External raster tool execution
pub mod tools;

pub use pipeline::{PipelineContext, PipelineDriver, PipelineState};

/// Datetime format used on the wire (second precision, no zone)
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Inclusive acquisition time window. Either bound may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Inclusive start
    pub start: Option<NaiveDateTime>,
    /// Inclusive end
    pub end: Option<NaiveDateTime>,
}

impl TimeRange {
    /// Create a time range from optional bounds
    pub fn new(start: Option<NaiveDateTime>, end: Option<NaiveDateTime>) -> Self {
        Self { start, end }
    }

    /// Time range with both bounds open
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Start bound formatted for the platform
    pub fn start_param(&self) -> Option<String> {
        self.start.map(|dt| dt.format(DATETIME_FORMAT).to_string())
    }

    /// End bound formatted for the platform
    pub fn end_param(&self) -> Option<String> {
        self.end.map(|dt| dt.format(DATETIME_FORMAT).to_string())
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let start = self.start_param().unwrap_or_else(|| "..".to_string());
        let end = self.end_param().unwrap_or_else(|| "..".to_string());
        write!(f, "{start}/{end}")
    }
}

/// Opaque scene identifier from the remote catalog
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SceneId(String);

impl SceneId {
    /// Wrap a catalog identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SceneId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SceneId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A regular grid cell over the area of interest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tile {
    /// Stable key, unique within one grid
    pub key: String,
    /// Tile footprint as a GeoJSON geometry
    pub geometry: Value,
    /// Tile edge length in pixels
    pub tilesize: u32,
    /// Pixel size in meters
    pub resolution: f64,
    /// Padding in pixels around the tile
    pub pad: u32,
    /// The tile feature exactly as the platform described it; passed back on
    /// per-tile catalog and raster requests
    pub feature: Value,
}

impl Tile {
    /// Build an unpadded tile and synthesize its platform feature
    pub fn new(key: impl Into<String>, geometry: Value, tilesize: u32, resolution: f64) -> Self {
        let key = key.into();
        let feature = serde_json::json!({
            "type": "Feature",
            "geometry": geometry,
            "properties": {
                "key": key,
                "tilesize": tilesize,
                "resolution": resolution,
                "pad": 0,
            },
        });

        Self {
            key,
            geometry,
            tilesize,
            resolution,
            pad: 0,
            feature,
        }
    }
}

/// One independently fetchable unit of imagery
#[derive(Debug, Clone, PartialEq)]
pub enum WorkUnit {
    /// A whole catalog scene
    Scene(SceneId),
    /// A grid tile composited from every scene that touches it
    Tile(Tile),
}

impl WorkUnit {
    /// Stable identifier used for logging and output naming
    pub fn key(&self) -> &str {
        match self {
            WorkUnit::Scene(id) => id.as_str(),
            WorkUnit::Tile(tile) => &tile.key,
        }
    }

    /// Short label for the unit type
    pub fn kind(&self) -> &'static str {
        match self {
            WorkUnit::Scene(_) => "scene",
            WorkUnit::Tile(_) => "tile",
        }
    }
}

/// Everything needed to fetch one work unit
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// The unit to fetch
    pub unit: WorkUnit,
    /// Platform product identifier
    pub product_id: String,
    /// Requested bands; `None` means every band of the product
    pub bands: Option<Vec<String>>,
    /// Acquisition window
    pub time_range: TimeRange,
    /// Output path without extension
    pub output_prefix: PathBuf,
}

/// Outcome of fetching one work unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// A raster was written to the given path
    Written(PathBuf),
    /// The platform had no imagery for this unit
    NoData,
    /// The fetch failed; the unit is absent from the mosaic
    Failed(String),
}

/// Result of one work unit, produced exactly once per unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    /// Key of the unit this result belongs to
    pub key: String,
    /// What happened
    pub outcome: FetchOutcome,
}

impl FetchResult {
    /// Successful fetch
    pub fn written(key: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            key: key.into(),
            outcome: FetchOutcome::Written(path.into()),
        }
    }

    /// Soft failure: nothing to fetch
    pub fn no_data(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            outcome: FetchOutcome::NoData,
        }
    }

    /// Hard failure isolated to this unit
    pub fn failed(key: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            outcome: FetchOutcome::Failed(detail.into()),
        }
    }

    /// Whether a raster was produced
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, FetchOutcome::Written(_))
    }

    /// Path of the produced raster, present iff the fetch succeeded
    pub fn output_path(&self) -> Option<&Path> {
        match &self.outcome {
            FetchOutcome::Written(path) => Some(path),
            _ => None,
        }
    }

    /// Failure detail, present iff the fetch did not succeed
    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            FetchOutcome::Written(_) => None,
            FetchOutcome::NoData => Some("no data"),
            FetchOutcome::Failed(detail) => Some(detail),
        }
    }

    /// Same unit, raster moved to a new path. Non-success results are returned as is.
    pub fn relocated(&self, path: impl Into<PathBuf>) -> Self {
        match self.outcome {
            FetchOutcome::Written(_) => Self::written(self.key.clone(), path),
            _ => self.clone(),
        }
    }
}
