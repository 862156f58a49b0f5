//! Deterministic file naming for fetched rasters
//!
//! Every work unit writes exactly one file whose name is derived from the unit
//! key. Keys come from the remote platform and routinely contain `:` (tile keys
//! look like `512:0:30.0:15:-2:37`), so they are sanitized before they touch the
//! filesystem. A sanitized stem carries a short digest of the raw key, so
//! `x:y` and `x/y` never share a file.
//!
//! ```rust
//! use geotiff_fetcher::output::RasterPathBuilder;
//! use std::path::PathBuf;
//!
//! let path = RasterPathBuilder::new(PathBuf::from("/tmp/run"), "scene_a").build();
//! assert_eq!(path, PathBuf::from("/tmp/run/scene_a.tif"));
//!
//! let tile = RasterPathBuilder::new(PathBuf::from("/tmp/run"), "512:0:30.0:15:-2:37").build();
//! let name = tile.file_name().unwrap().to_str().unwrap();
//! assert!(name.starts_with("512_0_30.0_15_-2_37-"));
//! ```

use sha2::{Digest, Sha256};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Extension of every raster the pipeline writes
pub const RASTER_EXTENSION: &str = "tif";

/// Hex digits of the key digest appended to sanitized stems
const KEY_DIGEST_LEN: usize = 12;

/// Builder for raster paths inside a run directory
pub struct RasterPathBuilder {
    dir: PathBuf,
    stem: String,
}

impl RasterPathBuilder {
    /// Start a path for `key` inside `dir`
    pub fn new(dir: PathBuf, key: &str) -> Self {
        Self {
            dir,
            stem: raster_file_stem(key),
        }
    }

    /// Build the complete file path
    pub fn build(&self) -> PathBuf {
        raster_path_for_prefix(&self.dir.join(&self.stem))
    }
}

/// Path of the raster for `key` inside `dir`
pub fn raster_path(dir: &Path, key: &str) -> PathBuf {
    RasterPathBuilder::new(dir.to_path_buf(), key).build()
}

/// `<prefix>.tif`, appending the extension rather than replacing one
///
/// Stems such as `512_0_30.0_15_3_4` contain dots, so
/// [`Path::with_extension`] would cut them short.
pub fn raster_path_for_prefix(prefix: &Path) -> PathBuf {
    let mut name = OsString::from(prefix.as_os_str());
    name.push(".");
    name.push(RASTER_EXTENSION);
    PathBuf::from(name)
}

/// Filesystem-safe stem for a unit key
///
/// Distinct keys get distinct stems. A key that is already safe is used as is;
/// any other key is sanitized and suffixed with `-<digest>` of the raw key.
pub fn raster_file_stem(key: &str) -> String {
    let sanitized = sanitize_key(key);
    if !sanitized.is_empty() && sanitized == key && !has_digest_suffix(key) {
        return sanitized;
    }

    let stem = if sanitized.is_empty() { "_" } else { sanitized.as_str() };
    format!("{stem}-{}", key_digest(key))
}

/// Sibling path with `_<suffix>` inserted before the extension
///
/// `/out/scene.tif` with `warp` becomes `/out/scene_warp.tif`.
pub fn with_stem_suffix(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}_{suffix}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{suffix}"),
    };
    path.with_file_name(name)
}

/// Sanitize a platform key for filesystem safety
///
/// Prevents path traversal by replacing dangerous characters:
/// - `/`, `\`, `:` → `_`
/// - `..` → `__`
/// - whitespace → `_`
fn sanitize_key(key: &str) -> String {
    key.trim()
        .replace("..", "__")
        .replace(['/', '\\', ':'], "_")
        .replace(char::is_whitespace, "_")
}

fn key_digest(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..KEY_DIGEST_LEN].to_string()
}

// A safe key that already looks digest-suffixed is digested again so it
// cannot collide with a sanitized stem.
fn has_digest_suffix(key: &str) -> bool {
    match key.rsplit_once('-') {
        Some((_, tail)) => {
            tail.len() == KEY_DIGEST_LEN && tail.bytes().all(|b| b.is_ascii_hexdigit())
        }
        None => false,
    }
}
