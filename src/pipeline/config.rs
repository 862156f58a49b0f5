//! Pipeline configuration constants

use std::time::Duration;

/// Maximum number of retries for failed platform requests.
pub const MAX_RETRIES: u32 = 5;

/// Initial backoff delay in milliseconds.
pub const INITIAL_BACKOFF_MS: u64 = 1000; // 1 second

/// Maximum backoff delay in milliseconds.
pub const MAX_BACKOFF_MS: u64 = 30000; // 30 seconds

/// Per-request timeout for platform calls.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Product fetched when none is given
pub const DEFAULT_PRODUCT_ID: &str = "landsat:LC08:01:RT:TOAR";

/// Default nodata value for mosaic and warp
pub const DEFAULT_NODATA: i32 = 0;

/// Virtual mosaic file name inside the run directory
pub const MOSAIC_FILE_NAME: &str = "mosaic.vrt";

/// Prefix of the per-run working directory
pub const WORK_DIR_PREFIX: &str = "geotiff-";

/// Calculate exponential backoff delay
pub fn calculate_backoff(retry_count: u32) -> Duration {
    let delay_ms = INITIAL_BACKOFF_MS.saturating_mul(2u64.saturating_pow(retry_count));
    let delay_ms = delay_ms.min(MAX_BACKOFF_MS);
    Duration::from_millis(delay_ms)
}
