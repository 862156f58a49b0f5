//! Retrieval pipeline
//!
//! The pipeline runs in fixed stages, each owned by one component:
//!
//! 1. **Enumerating**: list scenes or tiles with [`enumerate::WorkUnitEnumerator`]
//! 2. **Dispatching**: fetch every unit with [`rasterize::Rasterizer`] through a
//!    bounded [`dispatch::ParallelDispatcher`]
//! 3. **Reprojecting**: bring every raster to a common CRS
//! 4. **Building mosaic**: write the manifest and a virtual mosaic over it
//! 5. **Merging**: materialize the mosaic as one GeoTIFF
//! 6. **Post-processing** (optional): resample, clip and reproject
//! 7. **Uploading** (optional): copy the GeoTIFF to a bucket
//!
//! [`driver::PipelineDriver`] sequences the stages and owns the per-run working
//! directory.
//!
//! # Error Handling
//!
//! Every stage error is wrapped in a [`PipelineError`] naming the stage and,
//! when one was created, the working directory kept for inspection.

use std::fmt;
use std::path::PathBuf;

pub mod config;
pub mod context;
pub mod dispatch;
pub mod driver;
pub mod enumerate;
pub mod rasterize;

pub use context::PipelineContext;
pub use dispatch::{DispatchError, DispatchSummary, ParallelDispatcher};
pub use driver::{PipelineDriver, PipelineReport, PipelineState};
pub use enumerate::{EnumerateError, WorkUnitEnumerator};
pub use rasterize::{RasterizeError, Rasterizer};

use crate::output::OutputError;
use crate::storage::UploadError;
use crate::tools::ToolError;

/// What went wrong in a pipeline stage
#[derive(Debug, thiserror::Error)]
pub enum PipelineErrorKind {
    /// The working directory could not be created
    #[error("working directory error: {0}")]
    WorkDir(String),

    /// Enumeration failed
    #[error(transparent)]
    Enumerate(#[from] EnumerateError),

    /// A fetch failed in sequential mode
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// An external tool failed
    #[error("external tool error: {0}")]
    Tool(#[from] ToolError),

    /// The manifest could not be written
    #[error("output error: {0}")]
    Output(#[from] OutputError),

    /// No unit produced a raster
    #[error("no rasters were fetched; nothing to mosaic")]
    NothingToMosaic,

    /// The upload failed
    #[error("upload error: {0}")]
    Upload(#[from] UploadError),

    /// Local file handling failed
    #[error("IO error: {0}")]
    Io(String),
}

/// A failed pipeline run
#[derive(Debug, thiserror::Error)]
pub struct PipelineError {
    /// Stage that was running when the run failed
    pub stage: PipelineState,
    /// Cause
    #[source]
    pub kind: PipelineErrorKind,
    /// Working directory kept for inspection
    pub work_dir: Option<PathBuf>,
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.stage, self.kind)
    }
}
