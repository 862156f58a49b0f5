//! GDAL command builders
//!
//! Each function encodes the fixed flag grammar of one pipeline stage:
//!
//! | Stage              | Tool             |
//! |--------------------|------------------|
//! | common CRS         | `gdalwarp`       |
//! | mosaic             | `gdalbuildvrt`   |
//! | merge              | `gdal_translate` |
//! | post-process       | `gdalwarp`       |

use super::ToolCommand;
use crate::output::path::with_stem_suffix;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// SRS every fetched raster is brought into before mosaicking
pub const COMMON_SRS: &str = "EPSG:4326";

/// Creation options shared by every GeoTIFF the pipeline writes
const COMPRESS_LZW: [&str; 2] = ["-co", "COMPRESS=LZW"];
const BIG_TIFF: [&str; 2] = ["-co", "BIGTIFF=YES"];

/// GDAL resampling algorithms accepted for post-processing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResampleAlg {
    /// Nearest neighbour
    Near,
    /// Bilinear
    Bilinear,
    /// Cubic convolution
    Cubic,
    /// Cubic spline
    CubicSpline,
    /// Lanczos windowed sinc
    Lanczos,
    /// Average of contributing pixels
    Average,
    /// Most frequent value
    Mode,
    /// Maximum
    Max,
    /// Minimum
    Min,
    /// Median
    Med,
    /// First quartile
    Q1,
    /// Third quartile
    Q3,
}

impl ResampleAlg {
    /// Every accepted algorithm, in GDAL's documentation order
    pub const ALL: [ResampleAlg; 12] = [
        ResampleAlg::Near,
        ResampleAlg::Bilinear,
        ResampleAlg::Cubic,
        ResampleAlg::CubicSpline,
        ResampleAlg::Lanczos,
        ResampleAlg::Average,
        ResampleAlg::Mode,
        ResampleAlg::Max,
        ResampleAlg::Min,
        ResampleAlg::Med,
        ResampleAlg::Q1,
        ResampleAlg::Q3,
    ];

    /// Name as passed to `-r`
    pub fn as_str(&self) -> &'static str {
        match self {
            ResampleAlg::Near => "near",
            ResampleAlg::Bilinear => "bilinear",
            ResampleAlg::Cubic => "cubic",
            ResampleAlg::CubicSpline => "cubicspline",
            ResampleAlg::Lanczos => "lanczos",
            ResampleAlg::Average => "average",
            ResampleAlg::Mode => "mode",
            ResampleAlg::Max => "max",
            ResampleAlg::Min => "min",
            ResampleAlg::Med => "med",
            ResampleAlg::Q1 => "q1",
            ResampleAlg::Q3 => "q3",
        }
    }
}

impl fmt::Display for ResampleAlg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResampleAlg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|alg| alg.as_str() == wanted)
            .ok_or_else(|| {
                let valid: Vec<&str> = Self::ALL.iter().map(ResampleAlg::as_str).collect();
                format!(
                    "Invalid resample algorithm: {s}. Valid options: {}",
                    valid.join(", ")
                )
            })
    }
}

/// Options for the final warp of the merged GeoTIFF
#[derive(Debug, Clone, PartialEq)]
pub struct WarpOptions {
    /// Source nodata value
    pub nodata: i32,
    /// Vector file to clip to
    pub cutline: Option<PathBuf>,
    /// Target pixel size and the algorithm used to reach it
    pub resolution: Option<(f64, ResampleAlg)>,
    /// Target SRS definition
    pub srs: Option<String>,
    /// Worker threads; more than one enables multithreaded warping
    pub threads: usize,
    /// Cache and warp memory in MB
    pub memory_mb: Option<u32>,
}

/// Directory, next to the fetched rasters, that holds their reprojected copies
pub const REPROJECTED_DIR: &str = "wgs";

/// Path for a raster reprojected to [`COMMON_SRS`]: same file name, under
/// [`REPROJECTED_DIR`] beside the input
pub fn reprojected_path(input: &Path) -> PathBuf {
    let dir = input.parent().unwrap_or_else(|| Path::new(""));
    match input.file_name() {
        Some(name) => dir.join(REPROJECTED_DIR).join(name),
        None => dir.join(REPROJECTED_DIR),
    }
}

/// Scratch path the final warp writes to before replacing the original
pub fn warp_output_path(output: &Path) -> PathBuf {
    with_stem_suffix(output, "warp")
}

/// `gdalwarp -r cubic -t_srs EPSG:4326 -co COMPRESS=LZW <input> <output>`
pub fn warp_to_common_srs(input: &Path, output: &Path) -> ToolCommand {
    ToolCommand::new("gdalwarp")
        .args(["-r", "cubic", "-t_srs", COMMON_SRS])
        .args(COMPRESS_LZW)
        .path_arg(input)
        .path_arg(output)
}

/// `gdalbuildvrt -srcnodata <n> -input_file_list <manifest> <vrt>`
pub fn build_vrt(nodata: i32, manifest: &Path, vrt: &Path) -> ToolCommand {
    ToolCommand::new("gdalbuildvrt")
        .args(["-srcnodata".to_string(), nodata.to_string()])
        .arg("-input_file_list")
        .path_arg(manifest)
        .path_arg(vrt)
}

/// `gdal_translate -co COMPRESS=LZW -co BIGTIFF=YES <vrt> <output>`
pub fn translate(vrt: &Path, output: &Path) -> ToolCommand {
    ToolCommand::new("gdal_translate")
        .args(COMPRESS_LZW)
        .args(BIG_TIFF)
        .path_arg(vrt)
        .path_arg(output)
}

/// Final resample / clip / reproject of the merged GeoTIFF into `output`
pub fn warp_final(options: &WarpOptions, input: &Path, output: &Path) -> ToolCommand {
    let mut cmd = ToolCommand::new("gdalwarp")
        .args(COMPRESS_LZW)
        .args(BIG_TIFF)
        .args(["-srcnodata".to_string(), options.nodata.to_string()])
        .arg("-dstalpha");

    if let Some(cutline) = &options.cutline {
        cmd = cmd.arg("-cutline").path_arg(cutline).arg("-crop_to_cutline");
    }
    if let Some((resolution, resample)) = options.resolution {
        cmd = cmd
            .arg("-tr")
            .arg(resolution.to_string())
            .arg(resolution.to_string())
            .arg("-r")
            .arg(resample.as_str());
    }
    if let Some(srs) = &options.srs {
        cmd = cmd.arg("-t_srs").arg(srs.clone());
    }
    if options.threads > 1 {
        cmd = cmd
            .arg("-multi")
            .arg("-wo")
            .arg(format!("NUM_THREADS={}", options.threads));
    }
    if let Some(memory) = options.memory_mb {
        cmd = cmd
            .args(["--config", "GDAL_CACHEMAX"])
            .arg(memory.to_string())
            .arg("-wm")
            .arg(memory.to_string());
    }

    cmd.path_arg(input).path_arg(output)
}
