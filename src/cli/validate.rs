//! Input validation
//!
//! Every argument is checked before anything is fetched. Local checks run
//! first so a bad extension or bucket fails without touching the platform;
//! the area and product/band checks then consult the platform.

use super::command::Cli;
use crate::pipeline::PipelineContext;
use crate::platform::{ImageryPlatform, PlatformError};
use crate::storage::BucketUri;
use crate::tools::gdal::ResampleAlg;
use crate::{TimeRange, DATETIME_FORMAT};
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Validation errors
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// Output file does not end in `.tif`
    #[error("output file must end in .tif: {0}")]
    InvalidExtension(String),

    /// Datetime in neither accepted format
    #[error("failed to parse datetime {0}: expected YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS")]
    InvalidDatetime(String),

    /// Start after end
    #[error("start datetime {start} is after end datetime {end}")]
    StartAfterEnd {
        /// Parsed start
        start: String,
        /// Parsed end
        end: String,
    },

    /// Product not known to the platform
    #[error("product {0} not found")]
    UnknownProduct(String),

    /// Bands not offered by the product
    #[error("bands {bands:?} are not valid for product {product_id}")]
    InvalidBands {
        /// Product the bands were checked against
        product_id: String,
        /// Offending bands
        bands: Vec<String>,
    },

    /// Area of interest could not be read
    #[error("invalid geojson {source_name}: {reason}")]
    InvalidGeoJson {
        /// File path or place name given
        source_name: String,
        /// What went wrong
        reason: String,
    },

    /// Resolution and resampling algorithm are inconsistent
    #[error("resolution {resolution:?} and resample {resample:?} are invalid: {reason}")]
    InvalidResolution {
        /// Requested resolution
        resolution: Option<f64>,
        /// Requested algorithm
        resample: Option<String>,
        /// What went wrong
        reason: String,
    },

    /// Tile size given without what tile mode needs
    #[error("invalid tilesize: {0}")]
    InvalidTilesize(String),

    /// Worker count is zero
    #[error("number of workers must be at least 1")]
    ZeroWorkers,

    /// Cutline file missing
    #[error("cutline {} does not exist", .0.display())]
    MissingCutline(PathBuf),

    /// Bucket URI malformed
    #[error("gs_bucket {0} is invalid: must start with gs://")]
    InvalidBucket(String),

    /// Local filesystem problem while resolving a path
    #[error("IO error: {0}")]
    Io(String),

    /// The platform could not answer a validation query
    #[error("platform error: {0}")]
    Platform(#[from] PlatformError),
}

/// Result type for validation
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Output path must end in `.tif`; relative paths resolve against the current directory
pub fn check_tif_file(tif_file: &str) -> ValidationResult<PathBuf> {
    if !tif_file.ends_with(".tif") {
        return Err(ValidationError::InvalidExtension(tif_file.to_string()));
    }

    let path = PathBuf::from(tif_file);
    if path.is_absolute() {
        return Ok(path);
    }
    let cwd = std::env::current_dir()
        .map_err(|e| ValidationError::Io(format!("Failed to resolve current directory: {e}")))?;
    Ok(cwd.join(path))
}

/// Parse `YYYY-MM-DDTHH:MM:SS` or `YYYY-MM-DD`
///
/// A date-only end bound covers the whole day (23:59:59).
pub fn parse_datetime(input: &str, end_of_day: bool) -> ValidationResult<NaiveDateTime> {
    let input = input.trim();
    if input.contains('T') {
        return NaiveDateTime::parse_from_str(input, DATETIME_FORMAT)
            .map_err(|_| ValidationError::InvalidDatetime(input.to_string()));
    }

    let date = NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .map_err(|_| ValidationError::InvalidDatetime(input.to_string()))?;
    let datetime = if end_of_day {
        date.and_hms_opt(23, 59, 59)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    datetime.ok_or_else(|| ValidationError::InvalidDatetime(input.to_string()))
}

/// Parse both bounds and check their order
pub fn check_datetimes(start: Option<&str>, end: Option<&str>) -> ValidationResult<TimeRange> {
    let start = start.map(|s| parse_datetime(s, false)).transpose()?;
    let end = end.map(|e| parse_datetime(e, true)).transpose()?;

    if let (Some(s), Some(e)) = (start, end) {
        if s > e {
            return Err(ValidationError::StartAfterEnd {
                start: s.format(DATETIME_FORMAT).to_string(),
                end: e.format(DATETIME_FORMAT).to_string(),
            });
        }
    }
    Ok(TimeRange::new(start, end))
}

/// A resolution needs a resampling algorithm, and an algorithm needs a resolution
pub fn check_resolution_resample(
    resolution: Option<f64>,
    resample: Option<&str>,
) -> ValidationResult<(Option<f64>, Option<ResampleAlg>)> {
    let invalid = |reason: String| ValidationError::InvalidResolution {
        resolution,
        resample: resample.map(str::to_string),
        reason,
    };

    match (resolution, resample) {
        (None, None) => Ok((None, None)),
        (None, Some(_)) => Err(invalid("resample requires a resolution".to_string())),
        (Some(_), None) => Err(invalid("resolution requires a resample algorithm".to_string())),
        (Some(r), Some(alg)) => {
            if !r.is_finite() || r <= 0.0 {
                return Err(invalid("resolution must be a positive number".to_string()));
            }
            let alg = alg.parse::<ResampleAlg>().map_err(invalid)?;
            Ok((Some(r), Some(alg)))
        }
    }
}

/// Tile mode needs a non-zero tile size, a resolution and an area
pub fn check_tilesize(
    tilesize: Option<u32>,
    resolution: Option<f64>,
    has_area: bool,
) -> ValidationResult<Option<u32>> {
    let Some(tilesize) = tilesize else {
        return Ok(None);
    };
    if tilesize == 0 {
        return Err(ValidationError::InvalidTilesize("tilesize must be positive".to_string()));
    }
    if resolution.is_none() {
        return Err(ValidationError::InvalidTilesize(
            "tilesize requires --resolution".to_string(),
        ));
    }
    if !has_area {
        return Err(ValidationError::InvalidTilesize(
            "tilesize requires --geojson".to_string(),
        ));
    }
    Ok(Some(tilesize))
}

/// Worker count must be positive
pub fn check_num_workers(num_workers: usize) -> ValidationResult<NonZeroUsize> {
    NonZeroUsize::new(num_workers).ok_or(ValidationError::ZeroWorkers)
}

/// An SRS should mention `EPSG` or `proj`; anything else only warns
pub fn check_srs(srs: Option<&str>) -> Option<String> {
    let srs = srs?;
    if !srs.contains("EPSG") && !srs.contains("proj") {
        warn!(srs = %srs, "SRS does not look like an EPSG code or proj string");
    }
    Some(srs.to_string())
}

/// Cutline file must exist
pub fn check_cutline(cutline: Option<&Path>) -> ValidationResult<Option<PathBuf>> {
    match cutline {
        None => Ok(None),
        Some(path) if path.exists() => Ok(Some(path.to_path_buf())),
        Some(path) => Err(ValidationError::MissingCutline(path.to_path_buf())),
    }
}

/// Bucket must be a `gs://` URI
pub fn check_gs_bucket(gs_bucket: Option<&str>) -> ValidationResult<Option<BucketUri>> {
    gs_bucket
        .map(|b| BucketUri::parse(b).map_err(|_| ValidationError::InvalidBucket(b.to_string())))
        .transpose()
}

/// `--remove-local` only makes sense with a bucket
pub fn check_remove_local(remove_local: bool, has_bucket: bool) -> bool {
    if remove_local && !has_bucket {
        warn!("--remove-local ignored without --gs-bucket");
        return false;
    }
    remove_local
}

/// Reduce GeoJSON to one geometry
///
/// A FeatureCollection contributes its first feature, a Feature its geometry;
/// anything else is taken as a geometry already.
pub fn extract_geometry(source_name: &str, geojson: Value) -> ValidationResult<Value> {
    let invalid = |reason: &str| ValidationError::InvalidGeoJson {
        source_name: source_name.to_string(),
        reason: reason.to_string(),
    };

    if let Some(features) = geojson.get("features") {
        let features = features
            .as_array()
            .ok_or_else(|| invalid("features is not an array"))?;
        if features.len() > 1 {
            warn!(
                "Found {} features in {}, only taking the first",
                features.len(),
                source_name
            );
        }
        let first = features.first().ok_or_else(|| invalid("no features"))?;
        return first
            .get("geometry")
            .cloned()
            .ok_or_else(|| invalid("first feature has no geometry"));
    }

    if let Some(geometry) = geojson.get("geometry") {
        return Ok(geometry.clone());
    }

    if !geojson.is_object() {
        return Err(invalid("not a GeoJSON object"));
    }
    Ok(geojson)
}

/// Read the area of interest from a file, or resolve it as a named place
pub async fn check_geojson(
    platform: &dyn ImageryPlatform,
    geojson: Option<&str>,
) -> ValidationResult<Option<Value>> {
    let Some(source_name) = geojson else {
        return Ok(None);
    };

    let path = Path::new(source_name);
    let value = if path.is_file() {
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            ValidationError::InvalidGeoJson {
                source_name: source_name.to_string(),
                reason: e.to_string(),
            }
        })?;
        serde_json::from_str(&contents).map_err(|e| ValidationError::InvalidGeoJson {
            source_name: source_name.to_string(),
            reason: e.to_string(),
        })?
    } else {
        info!(place = %source_name, "Resolving area as a named place");
        platform.place_shape(source_name).await.map_err(|e| match e {
            PlatformError::NotFound(_) => ValidationError::InvalidGeoJson {
                source_name: source_name.to_string(),
                reason: "neither a readable file nor a known place".to_string(),
            },
            other => ValidationError::Platform(other),
        })?
    };

    extract_geometry(source_name, value).map(Some)
}

/// Product must exist and requested bands must be product or derived bands
pub async fn check_products_bands(
    platform: &dyn ImageryPlatform,
    product_id: &str,
    bands: Option<Vec<String>>,
) -> ValidationResult<Option<Vec<String>>> {
    platform.product(product_id).await.map_err(|e| match e {
        PlatformError::NotFound(_) => ValidationError::UnknownProduct(product_id.to_string()),
        other => ValidationError::Platform(other),
    })?;

    let Some(bands) = bands.filter(|b| !b.is_empty()) else {
        return Ok(None);
    };

    let mut available: HashSet<String> = platform
        .bands(product_id)
        .await?
        .into_iter()
        .map(|b| b.name)
        .collect();
    available.extend(platform.derived_bands().await?.into_iter().map(|b| b.name));

    let unknown: Vec<String> = bands
        .iter()
        .filter(|b| !available.contains(*b))
        .cloned()
        .collect();
    if !unknown.is_empty() {
        return Err(ValidationError::InvalidBands {
            product_id: product_id.to_string(),
            bands: unknown,
        });
    }
    Ok(Some(bands))
}

/// Validate every argument and assemble the run context
pub async fn build_context(
    cli: &Cli,
    platform: &dyn ImageryPlatform,
) -> ValidationResult<PipelineContext> {
    let output_path = check_tif_file(&cli.tif_file)?;
    let time_range = check_datetimes(cli.start_datetime.as_deref(), cli.end_datetime.as_deref())?;
    let (resolution, resample) =
        check_resolution_resample(cli.resolution, cli.resample.as_deref())?;
    let num_workers = check_num_workers(cli.num_workers)?;
    let srs = check_srs(cli.srs.as_deref());
    let cutline = check_cutline(cli.cutline.as_deref())?;
    let bucket = check_gs_bucket(cli.gs_bucket.as_deref())?;
    let remove_local = check_remove_local(cli.remove_local, bucket.is_some());
    let tilesize = check_tilesize(cli.tilesize, resolution, cli.geojson.is_some())?;

    let area = check_geojson(platform, cli.geojson.as_deref()).await?;
    let bands = check_products_bands(platform, &cli.product_id, cli.bands.clone()).await?;

    let mut context = PipelineContext::new(cli.product_id.clone(), output_path)
        .with_bands(bands)
        .with_time_range(time_range)
        .with_area(area)
        .with_resolution(resolution)
        .with_tilesize(tilesize)
        .with_resample(resample)
        .with_num_workers(num_workers)
        .with_nodata(cli.nodata)
        .with_srs(srs)
        .with_gdal_mem_mb(cli.gdal_mem)
        .with_cutline(cutline)
        .with_bucket(bucket, remove_local)
        .with_verbose(cli.verbose);
    if let Some(work_dir) = &cli.work_dir {
        context = context.with_work_dir_base(work_dir.clone());
    }
    Ok(context)
}
