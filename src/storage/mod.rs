//! Cloud bucket upload
//!
//! The finished GeoTIFF is copied with `gsutil` and optionally removed locally.
//! A failed copy never removes the local file.

use crate::tools::{ToolCommand, ToolError, ToolRunner};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

/// Scheme every bucket URI must use
pub const BUCKET_SCHEME: &str = "gs://";

/// Upload errors
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// The bucket URI is malformed
    #[error("invalid bucket URI {0}: must start with gs:// and name a bucket")]
    InvalidBucket(String),

    /// The copy command failed
    #[error("copy failed: {0}")]
    Copy(#[from] ToolError),

    /// The local file could not be removed after a successful copy
    #[error("uploaded, but failed to remove local file: {0}")]
    RemoveLocal(String),
}

/// A validated `gs://bucket[/prefix]` destination, stored without a trailing slash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketUri(String);

impl BucketUri {
    /// Parse and validate a bucket URI
    pub fn parse(s: &str) -> Result<Self, UploadError> {
        let trimmed = s.trim().trim_end_matches('/');
        let Some(rest) = trimmed.strip_prefix(BUCKET_SCHEME) else {
            return Err(UploadError::InvalidBucket(s.to_string()));
        };
        let bucket = rest.split('/').next().unwrap_or_default();
        if bucket.is_empty() || bucket.contains(char::is_whitespace) {
            return Err(UploadError::InvalidBucket(s.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// The URI without a trailing slash
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Remote URI a local file lands at
    pub fn object_uri(&self, file: &Path) -> String {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("{}/{}", self.0, name)
    }
}

impl fmt::Display for BucketUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for BucketUri {
    type Err = UploadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// `gsutil -q cp <file> <bucket>/`
pub fn copy_command(file: &Path, bucket: &BucketUri) -> ToolCommand {
    ToolCommand::new("gsutil")
        .args(["-q", "cp"])
        .path_arg(file)
        .arg(format!("{bucket}/"))
}

/// Copies files to a bucket with `gsutil`
pub struct GsutilUploader {
    runner: Arc<dyn ToolRunner>,
}

impl GsutilUploader {
    /// Create an uploader running commands through `runner`
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self { runner }
    }

    /// Copy `file` into `bucket`, then delete it locally if `remove_local` is set
    ///
    /// Returns the remote object URI.
    pub async fn upload(
        &self,
        file: &Path,
        bucket: &BucketUri,
        remove_local: bool,
    ) -> Result<String, UploadError> {
        let command = copy_command(file, bucket);
        self.runner.run(&command).await?;

        let remote = bucket.object_uri(file);
        info!(remote = %remote, "Copied GeoTIFF to bucket");

        if remove_local {
            tokio::fs::remove_file(file)
                .await
                .map_err(|e| UploadError::RemoveLocal(format!("{}: {e}", file.display())))?;
            info!(path = %file.display(), "Removed local GeoTIFF");
        }

        Ok(remote)
    }
}
