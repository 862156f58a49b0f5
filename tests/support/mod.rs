//! Fake collaborators shared by the integration tests

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use geotiff_fetcher::pipeline::PipelineContext;
use geotiff_fetcher::platform::{
    Band, ImageryPlatform, PlatformError, PlatformResult, Product, RasterData, RasterRequest,
    SceneQuery, TileGridRequest, TileStream,
};
use geotiff_fetcher::tools::{ToolCommand, ToolError, ToolRunner};
use geotiff_fetcher::{SceneId, Tile};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Minimal little-endian TIFF payload
pub const FAKE_TIFF: &[u8] = b"II*\0fake-geotiff";

/// Square polygon used as an area of interest
pub fn aoi() -> Value {
    json!({
        "type": "Polygon",
        "coordinates": [[[-94.0, 35.0], [-93.0, 35.0], [-93.0, 36.0], [-94.0, 36.0], [-94.0, 35.0]]],
    })
}

/// `rows` x `cols` grid of tiles keyed like the platform's DLTile keys
pub fn grid(rows: usize, cols: usize, tilesize: u32, resolution: f64) -> Vec<Tile> {
    let mut tiles = Vec::new();
    for row in 0..rows {
        for col in 0..cols {
            let key = format!("{tilesize}:0:{resolution:.1}:15:{row}:{col}");
            let geometry = json!({
                "type": "Polygon",
                "coordinates": [[
                    [col as f64, row as f64],
                    [col as f64 + 1.0, row as f64],
                    [col as f64 + 1.0, row as f64 + 1.0],
                    [col as f64, row as f64 + 1.0],
                    [col as f64, row as f64],
                ]],
            });
            tiles.push(Tile::new(key, geometry, tilesize, resolution));
        }
    }
    tiles
}

/// In-memory imagery platform
#[derive(Default)]
pub struct FakePlatform {
    products: HashSet<String>,
    bands: Vec<String>,
    derived_bands: Vec<String>,
    places: HashMap<String, Value>,
    scenes: Vec<SceneId>,
    tiles: Vec<Tile>,
    tile_scenes: HashMap<String, Vec<SceneId>>,
    empty: HashSet<String>,
    failing: HashSet<String>,
    garbage: HashSet<String>,
    /// Every catalog query received
    pub searches: Mutex<Vec<SceneQuery>>,
    /// Every raster request received
    pub rasters: Mutex<Vec<RasterRequest>>,
}

impl FakePlatform {
    /// Platform knowing one product with red/green/blue bands and an `ndvi` derived band
    pub fn new(product_id: &str) -> Self {
        Self {
            products: HashSet::from([product_id.to_string()]),
            bands: vec!["red".into(), "green".into(), "blue".into()],
            derived_bands: vec!["derived:ndvi".into()],
            ..Self::default()
        }
    }

    /// Catalog answer for scene-mode searches
    pub fn with_scenes(mut self, ids: &[&str]) -> Self {
        self.scenes = ids.iter().map(|id| SceneId::from(*id)).collect();
        self
    }

    /// Tile grid answer
    pub fn with_tiles(mut self, tiles: Vec<Tile>) -> Self {
        self.tiles = tiles;
        self
    }

    /// Scenes intersecting one tile
    pub fn with_tile_scenes(mut self, tile_key: &str, ids: &[&str]) -> Self {
        self.tile_scenes.insert(
            tile_key.to_string(),
            ids.iter().map(|id| SceneId::from(*id)).collect(),
        );
        self
    }

    /// A named place
    pub fn with_place(mut self, slug: &str, shape: Value) -> Self {
        self.places.insert(slug.to_string(), shape);
        self
    }

    /// The raster for `key` (scene id or tile key) comes back empty
    pub fn with_empty_raster(mut self, key: &str) -> Self {
        self.empty.insert(key.to_string());
        self
    }

    /// The raster for `key` fails with a network error
    pub fn with_failing_raster(mut self, key: &str) -> Self {
        self.failing.insert(key.to_string());
        self
    }

    /// The raster for `key` is not a GeoTIFF
    pub fn with_garbage_raster(mut self, key: &str) -> Self {
        self.garbage.insert(key.to_string());
        self
    }

    fn raster_key(request: &RasterRequest) -> String {
        request
            .dltile
            .as_ref()
            .and_then(|t| t["properties"]["key"].as_str())
            .map(str::to_string)
            .unwrap_or_else(|| request.ids.first().cloned().unwrap_or_default())
    }
}

#[async_trait]
impl ImageryPlatform for FakePlatform {
    async fn product(&self, product_id: &str) -> PlatformResult<Product> {
        if !self.products.contains(product_id) {
            return Err(PlatformError::NotFound(format!("product {product_id}")));
        }
        Ok(Product {
            id: product_id.to_string(),
            title: None,
        })
    }

    async fn bands(&self, _product_id: &str) -> PlatformResult<Vec<Band>> {
        Ok(self.bands.iter().map(|name| Band { name: name.clone() }).collect())
    }

    async fn derived_bands(&self) -> PlatformResult<Vec<Band>> {
        Ok(self
            .derived_bands
            .iter()
            .map(|name| Band { name: name.clone() })
            .collect())
    }

    async fn place_shape(&self, slug: &str) -> PlatformResult<Value> {
        self.places
            .get(slug)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(format!("place {slug}")))
    }

    async fn search_ids(&self, query: &SceneQuery) -> PlatformResult<Vec<SceneId>> {
        self.searches.lock().unwrap().push(query.clone());
        match &query.dltile {
            Some(tile) => {
                let key = tile["properties"]["key"].as_str().unwrap_or_default();
                Ok(self.tile_scenes.get(key).cloned().unwrap_or_default())
            }
            None => Ok(self.scenes.clone()),
        }
    }

    async fn tiles_from_shape(&self, _request: &TileGridRequest) -> PlatformResult<TileStream> {
        let tiles: Vec<PlatformResult<Tile>> = self.tiles.iter().cloned().map(Ok).collect();
        Ok(Box::pin(stream::iter(tiles)))
    }

    async fn raster(&self, request: &RasterRequest) -> PlatformResult<RasterData> {
        self.rasters.lock().unwrap().push(request.clone());
        let key = Self::raster_key(request);
        if self.failing.contains(&key) {
            return Err(PlatformError::NetworkError(format!("connection reset fetching {key}")));
        }
        if self.empty.contains(&key) {
            return Ok(RasterData::Empty);
        }
        if self.garbage.contains(&key) {
            return Ok(RasterData::Image(Bytes::from_static(b"<html>bad gateway</html>")));
        }
        Ok(RasterData::Image(Bytes::from_static(FAKE_TIFF)))
    }
}

/// Tool runner that fakes GDAL and gsutil by creating their output files
#[derive(Default)]
pub struct FakeTools {
    fail_program: Option<String>,
    /// Every command received, in order
    pub commands: Mutex<Vec<ToolCommand>>,
    /// Manifest lines as seen by the mosaic step
    pub manifest_lines: Mutex<Vec<String>>,
}

impl FakeTools {
    /// Tools that always succeed
    pub fn new() -> Self {
        Self::default()
    }

    /// Tools where `program` exits non-zero
    pub fn failing(program: &str) -> Self {
        Self {
            fail_program: Some(program.to_string()),
            ..Self::default()
        }
    }

    /// Program names in invocation order
    pub fn programs(&self) -> Vec<String> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.program.clone())
            .collect()
    }

    /// Commands for one program
    pub fn commands_for(&self, program: &str) -> Vec<ToolCommand> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.program == program)
            .cloned()
            .collect()
    }

    /// Manifest lines captured from the mosaic step
    pub fn manifest(&self) -> Vec<String> {
        self.manifest_lines.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolRunner for FakeTools {
    async fn run(&self, command: &ToolCommand) -> Result<(), ToolError> {
        self.commands.lock().unwrap().push(command.clone());

        if self.fail_program.as_deref() == Some(command.program.as_str()) {
            return Err(ToolError::ExitStatus {
                command: command.to_string(),
                status: "exit status: 1".to_string(),
                stderr: "ERROR 1: fake failure".to_string(),
            });
        }

        if command.program == "gdalbuildvrt" {
            let manifest = command
                .flag_value("-input_file_list")
                .expect("mosaic command names its manifest");
            let contents = std::fs::read_to_string(manifest).expect("manifest is readable");
            *self.manifest_lines.lock().unwrap() = contents.lines().map(str::to_string).collect();
        }

        if command.program.starts_with("gdal") {
            let output = command.last_arg().expect("GDAL commands end with their output");
            std::fs::write(output, FAKE_TIFF).expect("tool output is writable");
        }
        Ok(())
    }
}

/// Scene-mode context writing `out/result.tif` with run directories under `work`
pub fn context(root: &Path, product_id: &str) -> PipelineContext {
    PipelineContext::new(product_id, output_path(root)).with_work_dir_base(work_base(root))
}

/// Final GeoTIFF path used by [`context`]
pub fn output_path(root: &Path) -> PathBuf {
    root.join("out").join("result.tif")
}

/// Base for run directories used by [`context`]; created on demand
pub fn work_base(root: &Path) -> PathBuf {
    let base = root.join("work");
    std::fs::create_dir_all(&base).expect("work base is creatable");
    base
}

/// Entries currently in a directory
pub fn entries(dir: &Path) -> Vec<PathBuf> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .expect("directory is readable")
        .map(|e| e.expect("entry is readable").path())
        .collect();
    entries.sort();
    entries
}
