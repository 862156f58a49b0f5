//! Stage sequencing for one pipeline run

use super::config::{MOSAIC_FILE_NAME, WORK_DIR_PREFIX};
use super::dispatch::{DispatchSummary, ParallelDispatcher};
use super::enumerate::WorkUnitEnumerator;
use super::rasterize::Rasterizer;
use super::{PipelineContext, PipelineError, PipelineErrorKind};
use crate::output::ManifestWriter;
use crate::platform::ImageryPlatform;
use crate::storage::GsutilUploader;
use crate::tools::gdal::{self, reprojected_path, warp_output_path};
use crate::tools::ToolRunner;
use crate::FetchResult;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Pipeline stages, in the order they run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// Listing work units
    Enumerating,
    /// Fetching rasters
    Dispatching,
    /// Warping every raster to the common CRS
    ReprojectingToCommonCrs,
    /// Writing the manifest and the virtual mosaic
    BuildingMosaic,
    /// Materializing the mosaic
    Merging,
    /// Final resample, clip and reprojection
    PostProcessing,
    /// Copying the result to a bucket
    Uploading,
    /// Finished successfully
    Done,
    /// Stopped on an error
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Enumerating => "enumerating",
            PipelineState::Dispatching => "dispatching",
            PipelineState::ReprojectingToCommonCrs => "reprojecting to common CRS",
            PipelineState::BuildingMosaic => "building mosaic",
            PipelineState::Merging => "merging",
            PipelineState::PostProcessing => "post-processing",
            PipelineState::Uploading => "uploading",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Summary of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    /// Unit outcome counts
    pub summary: DispatchSummary,
    /// Final GeoTIFF path
    pub output_path: PathBuf,
    /// Remote URI, when uploaded
    pub uploaded_to: Option<String>,
    /// Whether the local GeoTIFF was removed after upload
    pub local_removed: bool,
    /// Every stage entered
    pub states: Vec<PipelineState>,
}

/// Runs the pipeline stages against one context
pub struct PipelineDriver {
    context: Arc<PipelineContext>,
    platform: Arc<dyn ImageryPlatform>,
    tools: Arc<dyn ToolRunner>,
    state: PipelineState,
    history: Vec<PipelineState>,
}

impl PipelineDriver {
    /// Create a driver; nothing runs until [`run`](Self::run)
    pub fn new(
        context: Arc<PipelineContext>,
        platform: Arc<dyn ImageryPlatform>,
        tools: Arc<dyn ToolRunner>,
    ) -> Self {
        Self {
            context,
            platform,
            tools,
            state: PipelineState::Enumerating,
            history: Vec::new(),
        }
    }

    /// Current stage
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Stages entered so far, in order
    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    fn enter(&mut self, state: PipelineState) {
        debug!(from = %self.state, to = %state, "Pipeline transition");
        self.state = state;
        self.history.push(state);
    }

    /// Run every stage to completion
    ///
    /// The working directory is removed on success and kept on failure; its
    /// path is then reported in the error.
    pub async fn run(&mut self) -> Result<PipelineReport, PipelineError> {
        self.enter(PipelineState::Enumerating);

        let work_dir = match tempfile::Builder::new()
            .prefix(WORK_DIR_PREFIX)
            .tempdir_in(&self.context.work_dir_base)
        {
            Ok(dir) => dir,
            Err(e) => {
                let message = format!("{}: {e}", self.context.work_dir_base.display());
                return Err(self.fail(PipelineErrorKind::WorkDir(message), None));
            }
        };
        info!(work_dir = %work_dir.path().display(), "Created working directory");

        let outcome = self.execute(work_dir.path()).await;
        match outcome {
            Ok(report) => {
                if let Err(e) = work_dir.close() {
                    warn!(error = %e, "Failed to remove working directory");
                }
                Ok(report)
            }
            Err(kind) => {
                let kept = work_dir.keep();
                Err(self.fail(kind, Some(kept)))
            }
        }
    }

    fn fail(&mut self, kind: PipelineErrorKind, work_dir: Option<PathBuf>) -> PipelineError {
        let stage = self.state;
        self.enter(PipelineState::Failed);
        PipelineError {
            stage,
            kind,
            work_dir,
        }
    }

    async fn execute(&mut self, work_dir: &Path) -> Result<PipelineReport, PipelineErrorKind> {
        let ctx = self.context.clone();

        let enumerator = WorkUnitEnumerator::new(self.platform.clone(), ctx.clone());
        let units = enumerator
            .enumerate(ctx.area.as_ref(), ctx.resolution, ctx.tilesize)
            .await?;

        self.enter(PipelineState::Dispatching);
        let rasterizer = Rasterizer::new(self.platform.clone(), ctx.clone(), work_dir);
        let dispatcher = ParallelDispatcher::new(ctx.num_workers).with_progress(ctx.verbose);
        let results = dispatcher
            .dispatch(units, move |unit| {
                let rasterizer = rasterizer.clone();
                async move { rasterizer.rasterize(unit).await }
            })
            .await?;
        let summary = DispatchSummary::from_results(&results);

        self.enter(PipelineState::ReprojectingToCommonCrs);
        let results = self.reproject(results).await?;

        self.enter(PipelineState::BuildingMosaic);
        let manifest = ManifestWriter::write(work_dir, &results)?;
        if summary.written == 0 {
            return Err(PipelineErrorKind::NothingToMosaic);
        }
        let vrt = work_dir.join(MOSAIC_FILE_NAME);
        self.tools
            .run(&gdal::build_vrt(ctx.nodata, &manifest, &vrt))
            .await?;

        self.enter(PipelineState::Merging);
        let output = ctx.output_path.clone();
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PipelineErrorKind::Io(format!("{}: {e}", parent.display())))?;
        }
        self.tools.run(&gdal::translate(&vrt, &output)).await?;
        info!(path = %output.display(), "Merged GeoTIFF");

        if ctx.wants_post_processing() {
            self.enter(PipelineState::PostProcessing);
            let warped = warp_output_path(&output);
            self.tools
                .run(&gdal::warp_final(&ctx.warp_options(), &output, &warped))
                .await?;
            tokio::fs::rename(&warped, &output)
                .await
                .map_err(|e| PipelineErrorKind::Io(format!("{}: {e}", warped.display())))?;
            info!(path = %output.display(), "Post-processed GeoTIFF");
        }

        let mut uploaded_to = None;
        let mut local_removed = false;
        if let Some(bucket) = &ctx.bucket {
            self.enter(PipelineState::Uploading);
            let uploader = GsutilUploader::new(self.tools.clone());
            uploaded_to = Some(uploader.upload(&output, bucket, ctx.remove_local).await?);
            local_removed = ctx.remove_local;
        }

        self.enter(PipelineState::Done);
        info!(
            written = summary.written,
            no_data = summary.no_data,
            failed = summary.failed,
            "Pipeline complete"
        );

        Ok(PipelineReport {
            summary,
            output_path: output,
            uploaded_to,
            local_removed,
            states: self.history.clone(),
        })
    }

    /// Warp every successful raster to the common CRS into the `wgs/` directory,
    /// replacing the original
    async fn reproject(
        &self,
        results: Vec<FetchResult>,
    ) -> Result<Vec<FetchResult>, PipelineErrorKind> {
        let mut reprojected = Vec::with_capacity(results.len());
        for result in results {
            let raw = match result.output_path() {
                Some(path) => path.to_path_buf(),
                None => {
                    reprojected.push(result);
                    continue;
                }
            };
            let target = reprojected_path(&raw);
            if let Some(dir) = target.parent() {
                tokio::fs::create_dir_all(dir)
                    .await
                    .map_err(|e| PipelineErrorKind::Io(format!("{}: {e}", dir.display())))?;
            }
            self.tools
                .run(&gdal::warp_to_common_srs(&raw, &target))
                .await?;
            if let Err(e) = tokio::fs::remove_file(&raw).await {
                warn!(path = %raw.display(), error = %e, "Failed to remove raw raster");
            }
            reprojected.push(result.relocated(target));
        }
        Ok(reprojected)
    }
}
