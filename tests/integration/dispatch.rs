//! Integration tests for rasterizing work units through the dispatcher

use crate::support::{entries, grid, FakePlatform, FAKE_TIFF};
use geotiff_fetcher::pipeline::{
    DispatchError, DispatchSummary, ParallelDispatcher, PipelineContext, RasterizeError, Rasterizer,
};
use geotiff_fetcher::output::path::raster_path_for_prefix;
use geotiff_fetcher::output::raster_path;
use geotiff_fetcher::platform::ImageryPlatform;
use geotiff_fetcher::{FetchResult, SceneId, WorkUnit};
use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const PRODUCT: &str = "landsat:LC08:01:RT:TOAR";

fn rasterizer(platform: Arc<FakePlatform>, work_dir: &Path) -> Rasterizer {
    let platform: Arc<dyn ImageryPlatform> = platform;
    let context = PipelineContext::new(PRODUCT, "/tmp/out.tif").with_bands(Some(vec!["red".into()]));
    Rasterizer::new(platform, Arc::new(context), work_dir)
}

async fn run(
    rasterizer: Rasterizer,
    units: Vec<WorkUnit>,
    workers: usize,
) -> Result<Vec<FetchResult>, DispatchError> {
    ParallelDispatcher::new(NonZeroUsize::new(workers).unwrap())
        .dispatch(units, move |unit| {
            let rasterizer = rasterizer.clone();
            async move { rasterizer.rasterize(unit).await }
        })
        .await
}

fn scenes(ids: &[&str]) -> Vec<WorkUnit> {
    ids.iter().map(|id| WorkUnit::Scene(SceneId::from(*id))).collect()
}

fn written_names(results: &[FetchResult]) -> BTreeSet<String> {
    results
        .iter()
        .filter_map(FetchResult::output_path)
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect()
}

#[tokio::test]
async fn test_scene_written_under_key() {
    let temp_dir = TempDir::new().unwrap();
    let platform = Arc::new(FakePlatform::new(PRODUCT));
    let rasterizer = rasterizer(platform.clone(), temp_dir.path());

    let key = "landsat:LC08:01:RT:TOAR:meta_LC08_1";
    let result = rasterizer.rasterize(WorkUnit::Scene(SceneId::from(key))).await.unwrap();

    let path = result.output_path().unwrap();
    assert_eq!(path, raster_path(temp_dir.path(), key));
    assert_eq!(std::fs::read(path).unwrap(), FAKE_TIFF);
    assert_eq!(entries(temp_dir.path()).len(), 1, "no partial files left behind");

    let rasters = platform.rasters.lock().unwrap();
    assert_eq!(rasters[0].bands.as_deref(), Some(&["red".to_string()][..]));
    assert_eq!(rasters[0].dltile, None);
}

#[tokio::test]
async fn test_written_path_follows_request_prefix() {
    let temp_dir = TempDir::new().unwrap();
    let tile = grid(1, 1, 512, 30.0).remove(0);
    let platform = Arc::new(FakePlatform::new(PRODUCT).with_tile_scenes(&tile.key, &["s1"]));
    let rasterizer = rasterizer(platform, temp_dir.path());

    let request = rasterizer.request_for(WorkUnit::Tile(tile.clone()));
    assert_eq!(request.output_prefix.parent(), Some(temp_dir.path()));

    let result = rasterizer.rasterize(WorkUnit::Tile(tile)).await.unwrap();
    assert_eq!(result.output_path(), Some(raster_path_for_prefix(&request.output_prefix).as_path()));
}

#[tokio::test]
async fn test_tile_without_scenes_is_no_data() {
    let temp_dir = TempDir::new().unwrap();
    let tiles = grid(1, 2, 512, 30.0);
    let platform = Arc::new(
        FakePlatform::new(PRODUCT)
            .with_tile_scenes(&tiles[0].key, &["s1", "s2"])
            .with_empty_raster(&tiles[0].key),
    );
    let rasterizer = rasterizer(platform.clone(), temp_dir.path());

    // Scenes exist but the raster is empty
    let first = rasterizer.rasterize(WorkUnit::Tile(tiles[0].clone())).await.unwrap();
    assert_eq!(first, FetchResult::no_data(&tiles[0].key));

    // No scenes at all; no raster call is made
    let second = rasterizer.rasterize(WorkUnit::Tile(tiles[1].clone())).await.unwrap();
    assert_eq!(second, FetchResult::no_data(&tiles[1].key));

    assert_eq!(platform.rasters.lock().unwrap().len(), 1);
    assert!(entries(temp_dir.path()).is_empty());

    let searches = platform.searches.lock().unwrap();
    assert_eq!(searches.len(), 2);
    assert!(searches.iter().all(|q| q.dltile.is_some() && q.limit.is_none()));
}

#[tokio::test]
async fn test_tile_composites_all_scenes() {
    let temp_dir = TempDir::new().unwrap();
    let tile = grid(1, 1, 512, 30.0).remove(0);
    let platform = Arc::new(FakePlatform::new(PRODUCT).with_tile_scenes(&tile.key, &["s1", "s2"]));
    let rasterizer = rasterizer(platform.clone(), temp_dir.path());

    let result = rasterizer.rasterize(WorkUnit::Tile(tile.clone())).await.unwrap();
    assert!(result.is_success());

    let rasters = platform.rasters.lock().unwrap();
    assert_eq!(rasters[0].ids, vec!["s1".to_string(), "s2".to_string()]);
    assert_eq!(rasters[0].dltile.as_ref(), Some(&tile.feature));
}

#[tokio::test]
async fn test_empty_scene_raster_is_error() {
    let temp_dir = TempDir::new().unwrap();
    let platform = Arc::new(FakePlatform::new(PRODUCT).with_empty_raster("s1"));
    let err = rasterizer(platform, temp_dir.path())
        .rasterize(WorkUnit::Scene(SceneId::from("s1")))
        .await
        .unwrap_err();
    assert!(matches!(err, RasterizeError::MissingScene(_)));
}

#[tokio::test]
async fn test_non_tiff_payload_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let platform = Arc::new(FakePlatform::new(PRODUCT).with_garbage_raster("s1"));
    let err = rasterizer(platform, temp_dir.path())
        .rasterize(WorkUnit::Scene(SceneId::from("s1")))
        .await
        .unwrap_err();
    assert!(matches!(err, RasterizeError::InvalidRaster(_)));
    assert!(entries(temp_dir.path()).is_empty());
}

#[tokio::test]
async fn test_sequential_and_parallel_write_same_files() {
    let ids = ["a", "b", "c", "d", "e", "f"];

    let sequential_dir = TempDir::new().unwrap();
    let platform = Arc::new(FakePlatform::new(PRODUCT).with_empty_raster("x"));
    let sequential = run(rasterizer(platform.clone(), sequential_dir.path()), scenes(&ids), 1)
        .await
        .unwrap();

    let parallel_dir = TempDir::new().unwrap();
    let parallel = run(rasterizer(platform, parallel_dir.path()), scenes(&ids), 4)
        .await
        .unwrap();

    assert_eq!(sequential.len(), ids.len());
    assert_eq!(parallel.len(), ids.len());
    assert_eq!(written_names(&sequential), written_names(&parallel));
}

#[tokio::test]
async fn test_parallel_failure_isolated() {
    let temp_dir = TempDir::new().unwrap();
    let platform = Arc::new(FakePlatform::new(PRODUCT).with_failing_raster("c"));

    let results = run(rasterizer(platform, temp_dir.path()), scenes(&["a", "b", "c", "d"]), 3)
        .await
        .unwrap();

    assert_eq!(results.len(), 4);
    let summary = DispatchSummary::from_results(&results);
    assert_eq!(summary.written, 3);
    assert_eq!(summary.failed, 1);

    let failed = results.iter().find(|r| !r.is_success()).unwrap();
    assert_eq!(failed.key, "c");
    assert!(failed.error().unwrap().contains("connection reset"));

    for result in results.iter().filter(|r| r.is_success()) {
        assert!(result.output_path().unwrap().exists());
    }
}

#[tokio::test]
async fn test_sequential_failure_aborts() {
    let temp_dir = TempDir::new().unwrap();
    let platform = Arc::new(FakePlatform::new(PRODUCT).with_failing_raster("b"));

    let err = run(rasterizer(platform.clone(), temp_dir.path()), scenes(&["a", "b", "c"]), 1)
        .await
        .unwrap_err();

    let DispatchError::Fetch { key, source } = err;
    assert_eq!(key, "b");
    assert!(matches!(source, RasterizeError::Fetch(_)));
    // "c" was never requested
    assert_eq!(platform.rasters.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_parallel_colliding_keys_write_separate_files() {
    let temp_dir = TempDir::new().unwrap();
    let platform = Arc::new(FakePlatform::new(PRODUCT));
    let ids = ["x:y", "x/y", "x_y", "x y"];

    let results = run(rasterizer(platform, temp_dir.path()), scenes(&ids), 4)
        .await
        .unwrap();

    assert!(results.iter().all(FetchResult::is_success));
    assert_eq!(written_names(&results).len(), ids.len());
    assert_eq!(entries(temp_dir.path()).len(), ids.len());
}
