//! Mosaic manifest
//!
//! The mosaic step reads an explicit list of rasters instead of scanning the run
//! directory, so stray or partially written files never end up in the output.
//! The manifest is plain text: one absolute path per line, newline terminated,
//! no header.

use super::{OutputError, OutputResult};
use crate::FetchResult;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Fixed manifest file name inside the run directory
pub const MANIFEST_FILE_NAME: &str = "files.txt";

/// Writes the manifest once per run
pub struct ManifestWriter;

impl ManifestWriter {
    /// Path the manifest is written to for `output_dir`
    pub fn manifest_path(output_dir: &Path) -> PathBuf {
        output_dir.join(MANIFEST_FILE_NAME)
    }

    /// Write every successful result's raster path to `output_dir/files.txt`
    ///
    /// Results without a raster are skipped. Every listed file must exist;
    /// a successful result whose raster is gone fails the write. The manifest
    /// is created exclusively and an existing one is never overwritten.
    pub fn write(output_dir: &Path, results: &[FetchResult]) -> OutputResult<PathBuf> {
        let manifest_path = Self::manifest_path(output_dir);

        let mut lines = Vec::new();
        for result in results {
            let Some(path) = result.output_path() else {
                debug!(key = %result.key, reason = ?result.error(), "Skipping unit without raster");
                continue;
            };
            let absolute = path.canonicalize().map_err(|e| match e.kind() {
                ErrorKind::NotFound => OutputError::MissingRaster(path.to_path_buf()),
                _ => OutputError::IoError(format!("Failed to resolve {}: {e}", path.display())),
            })?;
            if !absolute.is_file() {
                return Err(OutputError::MissingRaster(path.to_path_buf()));
            }
            lines.push(absolute);
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&manifest_path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => OutputError::ManifestExists(manifest_path.clone()),
                _ => OutputError::IoError(format!(
                    "Failed to create manifest {}: {e}",
                    manifest_path.display()
                )),
            })?;

        let mut contents = String::new();
        for line in &lines {
            contents.push_str(&line.to_string_lossy());
            contents.push('\n');
        }
        file.write_all(contents.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|e| OutputError::IoError(format!("Failed to write manifest: {e}")))?;

        info!(
            entries = lines.len(),
            path = %manifest_path.display(),
            "Wrote mosaic manifest"
        );
        Ok(manifest_path)
    }
}
