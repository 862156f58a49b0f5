//! Command line surface

use super::validate::build_context;
use super::CliError;
use crate::pipeline::config::{DEFAULT_NODATA, DEFAULT_PRODUCT_ID, MAX_RETRIES};
use crate::pipeline::{PipelineDriver, PipelineError, PipelineReport};
use crate::platform::client::PlatformClient;
use crate::platform::config::PlatformConfig;
use crate::platform::ImageryPlatform;
use crate::tools::{ProcessRunner, ToolRunner};
use clap::Parser;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

/// Stage reported for failures before the pipeline starts
const SETUP_STAGE: &str = "validating";

/// GeoTIFF Fetcher CLI
#[derive(Parser, Debug)]
#[command(name = "geotiff-fetcher")]
#[command(about = "Fetch imagery scenes or tiles and mosaic them into one GeoTIFF", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Output GeoTIFF to create (.tif)
    pub tif_file: String,

    /// Product ID on the imagery platform
    #[arg(long, alias = "product_id", default_value = DEFAULT_PRODUCT_ID)]
    pub product_id: String,

    /// Bands to fetch (default: every band of the product)
    #[arg(long, num_args = 1..)]
    pub bands: Option<Vec<String>>,

    /// Start datetime (YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS)
    #[arg(long, alias = "start_datetime")]
    pub start_datetime: Option<String>,

    /// End datetime (YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS); a date covers the whole day
    #[arg(long, alias = "end_datetime")]
    pub end_datetime: Option<String>,

    /// Limit scenes to this region: a GeoJSON file or a named place
    #[arg(long)]
    pub geojson: Option<String>,

    /// Resolution in meters (requires --resample)
    #[arg(long)]
    pub resolution: Option<f64>,

    /// Tile size in pixels; fetches a tile grid instead of whole scenes
    #[arg(long)]
    pub tilesize: Option<u32>,

    /// GDAL resampling algorithm (near, bilinear, cubic, ...)
    #[arg(long)]
    pub resample: Option<String>,

    /// Number of concurrent fetches
    #[arg(long, alias = "num_workers", default_value_t = 1)]
    pub num_workers: usize,

    /// Nodata value to use in the GeoTIFF
    #[arg(long, default_value_t = DEFAULT_NODATA, allow_negative_numbers = true)]
    pub nodata: i32,

    /// Output spatial reference system
    #[arg(long)]
    pub srs: Option<String>,

    /// Memory for gdalwarp in MB
    #[arg(long, alias = "gdal_mem")]
    pub gdal_mem: Option<u32>,

    /// Vector file to clip the final GeoTIFF to
    #[arg(long)]
    pub cutline: Option<PathBuf>,

    /// Bucket to copy the final GeoTIFF to (gs://...)
    #[arg(long, alias = "gs_bucket")]
    pub gs_bucket: Option<String>,

    /// Remove the local GeoTIFF after copying it to the bucket
    #[arg(long, alias = "remove_local", default_value_t = false)]
    pub remove_local: bool,

    /// Verbose output (debug logs and a progress bar)
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Directory the per-run working directory is created in (default: system temp)
    #[arg(long)]
    pub work_dir: Option<PathBuf>,

    /// Imagery platform base URL
    #[arg(long, env = "GEOTIFF_PLATFORM_URL")]
    pub platform_url: String,

    /// Imagery platform API token
    #[arg(long, env = "GEOTIFF_PLATFORM_TOKEN", hide_env_values = true)]
    pub platform_token: Option<String>,

    /// Maximum number of retries for failed platform requests (range: 0-20)
    #[arg(long, default_value_t = MAX_RETRIES, value_parser = clap::value_parser!(u32).range(0..=20))]
    pub max_retries: u32,

    /// Output format (json or human)
    #[arg(long, default_value = "human")]
    pub output_format: OutputFormat,
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Human-readable output
    Human,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" => Ok(OutputFormat::Human),
            _ => Err(format!("Invalid output format: {s}")),
        }
    }
}

impl Cli {
    /// Run against the configured platform with the GDAL tools on `PATH`
    pub async fn execute(&self) -> Result<PipelineReport, CliError> {
        let platform = match self.platform_client() {
            Ok(platform) => platform,
            Err(e) => {
                self.report_setup_failure(&e);
                return Err(e);
            }
        };

        self.execute_with(platform, Arc::new(ProcessRunner::new()))
            .await
    }

    /// Run against explicit collaborators
    pub async fn execute_with(
        &self,
        platform: Arc<dyn ImageryPlatform>,
        tools: Arc<dyn ToolRunner>,
    ) -> Result<PipelineReport, CliError> {
        let context = match build_context(self, platform.as_ref()).await {
            Ok(context) => context,
            Err(e) => {
                let e = CliError::from(e);
                self.report_setup_failure(&e);
                return Err(e);
            }
        };
        info!(
            product = %context.product_id,
            output = %context.output_path.display(),
            workers = context.num_workers.get(),
            tile_mode = context.is_tile_mode(),
            "Starting pipeline"
        );

        let mut driver = PipelineDriver::new(Arc::new(context), platform, tools);
        let result = driver.run().await;

        match self.output_format {
            OutputFormat::Json => output_json(&result),
            OutputFormat::Human => output_human(&result),
        }

        Ok(result?)
    }

    fn platform_client(&self) -> Result<Arc<dyn ImageryPlatform>, CliError> {
        if self.platform_url.trim().is_empty() {
            return Err(CliError::InvalidArgument(
                "--platform-url must not be empty".to_string(),
            ));
        }

        let config = PlatformConfig::new(self.platform_url.trim())
            .with_token(self.platform_token.clone())
            .with_max_retries(self.max_retries);
        Ok(Arc::new(PlatformClient::new(config)?))
    }

    // Failures before the pipeline starts; main logs them, JSON callers also
    // get a result object on stdout
    fn report_setup_failure(&self, error: &CliError) {
        if self.output_format == OutputFormat::Json {
            println!("{}", setup_failure_json(error));
        }
    }
}

fn setup_failure_json(error: &CliError) -> serde_json::Value {
    serde_json::json!({
        "success": false,
        "stage": SETUP_STAGE,
        "work_dir": null,
        "error": error.to_string(),
    })
}

/// Output result as JSON
fn output_json(result: &Result<PipelineReport, PipelineError>) {
    let output = match result {
        Ok(report) => serde_json::json!({
            "success": true,
            "output_path": report.output_path.display().to_string(),
            "uploaded_to": report.uploaded_to,
            "local_removed": report.local_removed,
            "units": report.summary,
            "states": report.states,
            "error": null,
        }),
        Err(e) => serde_json::json!({
            "success": false,
            "stage": e.stage,
            "work_dir": e.work_dir.as_ref().map(|d| d.display().to_string()),
            "error": e.to_string(),
        }),
    };

    println!("{output}");
}

/// Output result in human-readable format
fn output_human(result: &Result<PipelineReport, PipelineError>) {
    match result {
        Ok(report) => {
            println!("\nGeoTIFF completed successfully!");
            if report.local_removed {
                println!("Output: {} (removed locally)", report.output_path.display());
            } else {
                println!("Output: {}", report.output_path.display());
            }
            if let Some(remote) = &report.uploaded_to {
                println!("Uploaded: {remote}");
            }
            println!("Units: {}", report.summary.total);
            println!("Rasters written: {}", report.summary.written);
            if report.summary.no_data > 0 {
                println!("Units without data: {}", report.summary.no_data);
            }
            if report.summary.failed > 0 {
                println!("Units failed: {}", report.summary.failed);
            }
        }
        Err(e) => {
            eprintln!("\nGeoTIFF pipeline failed!");
            eprintln!("Error: {e}");
            if let Some(work_dir) = &e.work_dir {
                eprintln!("Working directory kept at {}", work_dir.display());
            }
        }
    }
}
