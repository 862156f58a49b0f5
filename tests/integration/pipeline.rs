//! End-to-end pipeline runs against fake platform and tools

use crate::support::{aoi, context, entries, grid, output_path, FakePlatform, FakeTools};
use geotiff_fetcher::pipeline::{PipelineContext, PipelineDriver, PipelineErrorKind, PipelineState};
use geotiff_fetcher::storage::BucketUri;
use geotiff_fetcher::tools::gdal::ResampleAlg;
use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const PRODUCT: &str = "landsat:LC08:01:RT:TOAR";

fn driver(
    context: PipelineContext,
    platform: FakePlatform,
    tools: Arc<FakeTools>,
) -> PipelineDriver {
    PipelineDriver::new(Arc::new(context), Arc::new(platform), tools)
}

fn tile_context(root: &Path, workers: usize) -> PipelineContext {
    context(root, PRODUCT)
        .with_area(Some(aoi()))
        .with_resolution(Some(30.0))
        .with_tilesize(Some(512))
        .with_resample(Some(ResampleAlg::Near))
        .with_num_workers(NonZeroUsize::new(workers).unwrap())
}

#[tokio::test]
async fn test_tile_mode_run() {
    let root = TempDir::new().unwrap();
    let tiles = grid(2, 2, 512, 30.0);
    let platform = FakePlatform::new(PRODUCT)
        .with_tiles(tiles.clone())
        .with_tile_scenes(&tiles[0].key, &["s1"])
        .with_tile_scenes(&tiles[3].key, &["s2", "s3"]);
    let tools = Arc::new(FakeTools::new());

    let mut driver = driver(tile_context(root.path(), 4), platform, tools.clone());
    let report = driver.run().await.unwrap();

    assert_eq!(report.summary.total, 4);
    assert_eq!(report.summary.written, 2);
    assert_eq!(report.summary.no_data, 2);
    assert_eq!(report.output_path, output_path(root.path()));
    assert!(report.output_path.exists());
    assert_eq!(report.uploaded_to, None);

    assert_eq!(
        report.states,
        vec![
            PipelineState::Enumerating,
            PipelineState::Dispatching,
            PipelineState::ReprojectingToCommonCrs,
            PipelineState::BuildingMosaic,
            PipelineState::Merging,
            PipelineState::PostProcessing,
            PipelineState::Done,
        ]
    );
    assert_eq!(driver.state(), PipelineState::Done);

    let manifest = tools.manifest();
    assert_eq!(manifest.len(), 2);
    assert!(manifest
        .iter()
        .all(|line| Path::new(line).parent().and_then(Path::file_name) == Some(OsStr::new("wgs"))));
    assert!(manifest.iter().all(|line| Path::new(line).is_absolute()));

    // Final warp carries the requested resolution and resampling
    let warps = tools.commands_for("gdalwarp");
    let final_warp = warps.last().unwrap();
    assert_eq!(final_warp.flag_value("-tr"), Some("30"));
    assert_eq!(final_warp.flag_value("-r"), Some("near"));

    // Run directory cleaned up; scratch warp output renamed away
    assert!(entries(&root.path().join("work")).is_empty());
    assert_eq!(entries(&root.path().join("out")), vec![output_path(root.path())]);
}

#[tokio::test]
async fn test_scene_mode_runs_without_post_processing() {
    let root = TempDir::new().unwrap();
    let platform = FakePlatform::new(PRODUCT).with_scenes(&["s1", "s2", "s3"]);
    let tools = Arc::new(FakeTools::new());

    let report = driver(context(root.path(), PRODUCT), platform, tools.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(report.summary.written, 3);
    assert!(!report.states.contains(&PipelineState::PostProcessing));
    assert!(!report.states.contains(&PipelineState::Uploading));
    assert_eq!(
        tools.programs(),
        vec!["gdalwarp", "gdalwarp", "gdalwarp", "gdalbuildvrt", "gdal_translate"]
    );
    assert_eq!(tools.manifest().len(), 3);
}

#[tokio::test]
async fn test_colliding_scene_names_get_distinct_rasters() {
    let root = TempDir::new().unwrap();
    let platform = FakePlatform::new(PRODUCT).with_scenes(&["x:y", "x/y", "s1", "s1_wgs", "s1"]);
    let tools = Arc::new(FakeTools::new());
    let context = context(root.path(), PRODUCT).with_num_workers(NonZeroUsize::new(4).unwrap());

    let report = driver(context, platform, tools.clone()).run().await.unwrap();

    // The repeated "s1" is dropped before dispatch
    assert_eq!(report.summary.total, 4);
    assert_eq!(report.summary.written, 4);

    let manifest = tools.manifest();
    let unique: BTreeSet<&String> = manifest.iter().collect();
    assert_eq!(manifest.len(), 4);
    assert_eq!(unique.len(), 4);

    let warps = tools.commands_for("gdalwarp");
    let targets: BTreeSet<&str> = warps.iter().filter_map(|c| c.last_arg()).collect();
    assert_eq!(targets.len(), warps.len());
}

#[tokio::test]
async fn test_sequential_fetch_failure_keeps_work_dir() {
    let root = TempDir::new().unwrap();
    let platform = FakePlatform::new(PRODUCT)
        .with_scenes(&["s1", "s2", "s3"])
        .with_failing_raster("s2");
    let tools = Arc::new(FakeTools::new());

    let mut driver = driver(context(root.path(), PRODUCT), platform, tools.clone());
    let err = driver.run().await.unwrap_err();

    assert_eq!(err.stage, PipelineState::Dispatching);
    assert!(matches!(err.kind, PipelineErrorKind::Dispatch(_)));
    assert_eq!(driver.state(), PipelineState::Failed);
    assert!(!driver.history().contains(&PipelineState::BuildingMosaic));
    assert!(tools.programs().is_empty());

    let work_dir = err.work_dir.expect("failed run keeps its directory");
    assert!(work_dir.is_dir());
    assert!(!work_dir.join("files.txt").exists());
    assert!(!output_path(root.path()).exists());
}

#[tokio::test]
async fn test_parallel_failure_still_mosaics() {
    let root = TempDir::new().unwrap();
    let platform = FakePlatform::new(PRODUCT)
        .with_scenes(&["s1", "s2", "s3"])
        .with_failing_raster("s2");
    let tools = Arc::new(FakeTools::new());
    let context = context(root.path(), PRODUCT).with_num_workers(NonZeroUsize::new(3).unwrap());

    let report = driver(context, platform, tools.clone()).run().await.unwrap();

    assert_eq!(report.summary.failed, 1);
    assert_eq!(report.summary.written, 2);
    assert_eq!(tools.manifest().len(), 2);
}

#[tokio::test]
async fn test_nothing_fetched_fails_at_mosaic() {
    let root = TempDir::new().unwrap();
    let platform = FakePlatform::new(PRODUCT);
    let tools = Arc::new(FakeTools::new());

    let err = driver(context(root.path(), PRODUCT), platform, tools.clone())
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.stage, PipelineState::BuildingMosaic);
    assert!(matches!(err.kind, PipelineErrorKind::NothingToMosaic));
    assert!(tools.programs().is_empty());

    let work_dir = err.work_dir.unwrap();
    let manifest = std::fs::read_to_string(work_dir.join("files.txt")).unwrap();
    assert!(manifest.is_empty());
}

#[tokio::test]
async fn test_merge_failure_names_stage() {
    let root = TempDir::new().unwrap();
    let platform = FakePlatform::new(PRODUCT).with_scenes(&["s1"]);
    let tools = Arc::new(FakeTools::failing("gdal_translate"));

    let err = driver(context(root.path(), PRODUCT), platform, tools)
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.stage, PipelineState::Merging);
    assert!(matches!(err.kind, PipelineErrorKind::Tool(_)));
    assert!(err.to_string().starts_with("merging failed"));
    assert!(err.work_dir.unwrap().join("mosaic.vrt").exists());
}

#[tokio::test]
async fn test_upload_and_remove_local() {
    let root = TempDir::new().unwrap();
    let platform = FakePlatform::new(PRODUCT).with_scenes(&["s1"]);
    let tools = Arc::new(FakeTools::new());
    let bucket = BucketUri::parse("gs://imagery/exports").unwrap();
    let context = context(root.path(), PRODUCT).with_bucket(Some(bucket), true);

    let report = driver(context, platform, tools.clone()).run().await.unwrap();

    assert_eq!(report.uploaded_to.as_deref(), Some("gs://imagery/exports/result.tif"));
    assert!(report.local_removed);
    assert!(!report.output_path.exists());
    assert_eq!(report.states.last(), Some(&PipelineState::Done));
    assert!(report.states.contains(&PipelineState::Uploading));
    assert_eq!(tools.programs().last().map(String::as_str), Some("gsutil"));
}

#[tokio::test]
async fn test_upload_failure_keeps_local_output() {
    let root = TempDir::new().unwrap();
    let platform = FakePlatform::new(PRODUCT).with_scenes(&["s1"]);
    let tools = Arc::new(FakeTools::failing("gsutil"));
    let bucket = BucketUri::parse("gs://imagery").unwrap();
    let context = context(root.path(), PRODUCT).with_bucket(Some(bucket), true);

    let err = driver(context, platform, tools).run().await.unwrap_err();

    assert_eq!(err.stage, PipelineState::Uploading);
    assert!(matches!(err.kind, PipelineErrorKind::Upload(_)));
    assert!(output_path(root.path()).exists());
}
