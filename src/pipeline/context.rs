//! Validated run configuration
//!
//! A [`PipelineContext`] is assembled once (normally by `cli::validate`) and
//! shared read-only with every component through an `Arc`.

use crate::pipeline::config::{DEFAULT_NODATA, DEFAULT_PRODUCT_ID};
use crate::storage::BucketUri;
use crate::tools::gdal::{ResampleAlg, WarpOptions};
use crate::TimeRange;
use serde_json::Value;
use std::num::NonZeroUsize;
use std::path::PathBuf;

/// Everything a pipeline run needs to know
#[derive(Debug, Clone)]
pub struct PipelineContext {
    /// Final GeoTIFF path
    pub output_path: PathBuf,
    /// Platform product identifier
    pub product_id: String,
    /// Requested bands; `None` means every band
    pub bands: Option<Vec<String>>,
    /// Acquisition window
    pub time_range: TimeRange,
    /// Area of interest as a GeoJSON geometry
    pub area: Option<Value>,
    /// Target pixel size in meters
    pub resolution: Option<f64>,
    /// Tile edge length in pixels; enables tile mode
    pub tilesize: Option<u32>,
    /// Resampling algorithm for post-processing
    pub resample: Option<ResampleAlg>,
    /// Concurrent fetches
    pub num_workers: NonZeroUsize,
    /// Nodata value for mosaic and warp
    pub nodata: i32,
    /// Target SRS for post-processing
    pub srs: Option<String>,
    /// GDAL cache and warp memory in MB
    pub gdal_mem_mb: Option<u32>,
    /// Vector file to clip the result to
    pub cutline: Option<PathBuf>,
    /// Upload destination
    pub bucket: Option<BucketUri>,
    /// Delete the local GeoTIFF after upload
    pub remove_local: bool,
    /// Verbose output (progress bar, debug logs)
    pub verbose: bool,
    /// Directory the per-run working directory is created in
    pub work_dir_base: PathBuf,
}

impl PipelineContext {
    /// Scene-mode run over every area and time, one worker, no post-processing
    pub fn new(product_id: impl Into<String>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
            product_id: product_id.into(),
            bands: None,
            time_range: TimeRange::unbounded(),
            area: None,
            resolution: None,
            tilesize: None,
            resample: None,
            num_workers: NonZeroUsize::MIN,
            nodata: DEFAULT_NODATA,
            srs: None,
            gdal_mem_mb: None,
            cutline: None,
            bucket: None,
            remove_local: false,
            verbose: false,
            work_dir_base: std::env::temp_dir(),
        }
    }

    /// Restrict to these bands
    pub fn with_bands(mut self, bands: Option<Vec<String>>) -> Self {
        self.bands = bands;
        self
    }

    /// Set the acquisition window
    pub fn with_time_range(mut self, time_range: TimeRange) -> Self {
        self.time_range = time_range;
        self
    }

    /// Set the area of interest
    pub fn with_area(mut self, area: Option<Value>) -> Self {
        self.area = area;
        self
    }

    /// Set the target resolution
    pub fn with_resolution(mut self, resolution: Option<f64>) -> Self {
        self.resolution = resolution;
        self
    }

    /// Set the tile size, enabling tile mode
    pub fn with_tilesize(mut self, tilesize: Option<u32>) -> Self {
        self.tilesize = tilesize;
        self
    }

    /// Set the resampling algorithm
    pub fn with_resample(mut self, resample: Option<ResampleAlg>) -> Self {
        self.resample = resample;
        self
    }

    /// Set the worker count
    pub fn with_num_workers(mut self, num_workers: NonZeroUsize) -> Self {
        self.num_workers = num_workers;
        self
    }

    /// Set the nodata value
    pub fn with_nodata(mut self, nodata: i32) -> Self {
        self.nodata = nodata;
        self
    }

    /// Set the target SRS
    pub fn with_srs(mut self, srs: Option<String>) -> Self {
        self.srs = srs;
        self
    }

    /// Set the GDAL memory budget
    pub fn with_gdal_mem_mb(mut self, gdal_mem_mb: Option<u32>) -> Self {
        self.gdal_mem_mb = gdal_mem_mb;
        self
    }

    /// Set the cutline
    pub fn with_cutline(mut self, cutline: Option<PathBuf>) -> Self {
        self.cutline = cutline;
        self
    }

    /// Set the upload destination
    pub fn with_bucket(mut self, bucket: Option<BucketUri>, remove_local: bool) -> Self {
        self.bucket = bucket;
        self.remove_local = remove_local;
        self
    }

    /// Enable verbose output
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Set where the per-run working directory is created
    pub fn with_work_dir_base(mut self, base: impl Into<PathBuf>) -> Self {
        self.work_dir_base = base.into();
        self
    }

    /// Tile mode: a tile size was requested
    pub fn is_tile_mode(&self) -> bool {
        self.tilesize.is_some()
    }

    /// The merged GeoTIFF gets a final warp
    pub fn wants_post_processing(&self) -> bool {
        self.resolution.is_some() || self.srs.is_some()
    }

    /// The result is copied to a bucket
    pub fn wants_upload(&self) -> bool {
        self.bucket.is_some()
    }

    /// Options for the final warp
    ///
    /// The resolution is only passed on when a resampling algorithm goes
    /// with it.
    pub fn warp_options(&self) -> WarpOptions {
        WarpOptions {
            nodata: self.nodata,
            cutline: self.cutline.clone(),
            resolution: self.resolution.zip(self.resample),
            srs: self.srs.clone(),
            threads: self.num_workers.get(),
            memory_mb: self.gdal_mem_mb,
        }
    }
}
