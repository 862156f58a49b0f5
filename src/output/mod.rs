//! Raster naming and the mosaic manifest

use std::path::PathBuf;

pub mod manifest;
pub mod path;

pub use manifest::{ManifestWriter, MANIFEST_FILE_NAME};
pub use path::{raster_file_stem, raster_path, RasterPathBuilder};

/// Output errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// A successful result points at a file that is not on disk
    #[error("raster listed as written but missing on disk: {}", .0.display())]
    MissingRaster(PathBuf),

    /// The manifest for this run was already written
    #[error("manifest already exists: {}", .0.display())]
    ManifestExists(PathBuf),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;
