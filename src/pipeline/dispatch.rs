//! Bounded fan-out of work units
//!
//! With one worker, units run in input order and the first error aborts the
//! batch. With more, every unit runs as its own task, at most `worker_count`
//! at a time, and a failing unit becomes a [`FetchResult::failed`] without
//! touching its siblings.

use super::rasterize::RasterizeError;
use crate::{FetchOutcome, FetchResult, WorkUnit};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::future::Future;
use std::num::NonZeroUsize;
use tracing::{info, warn};

/// Dispatch errors
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Sequential mode stops at the first failing unit
    #[error("unit {key} failed: {source}")]
    Fetch {
        /// Key of the failing unit
        key: String,
        /// Underlying error
        #[source]
        source: RasterizeError,
    },
}

/// Outcome counts for one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    /// Units dispatched
    pub total: usize,
    /// Units with a raster
    pub written: usize,
    /// Units without imagery
    pub no_data: usize,
    /// Units that failed
    pub failed: usize,
}

impl DispatchSummary {
    /// Count outcomes in `results`
    pub fn from_results(results: &[FetchResult]) -> Self {
        results.iter().fold(
            Self {
                total: results.len(),
                ..Self::default()
            },
            |mut summary, result| {
                match result.outcome {
                    FetchOutcome::Written(_) => summary.written += 1,
                    FetchOutcome::NoData => summary.no_data += 1,
                    FetchOutcome::Failed(_) => summary.failed += 1,
                }
                summary
            },
        )
    }
}

/// Runs a fetch function over every unit with bounded concurrency
#[derive(Debug, Clone)]
pub struct ParallelDispatcher {
    worker_count: NonZeroUsize,
    show_progress: bool,
}

impl ParallelDispatcher {
    /// Dispatcher with `worker_count` workers
    pub fn new(worker_count: NonZeroUsize) -> Self {
        Self {
            worker_count,
            show_progress: false,
        }
    }

    /// Draw a progress bar while dispatching
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Configured worker count
    pub fn worker_count(&self) -> NonZeroUsize {
        self.worker_count
    }

    /// Run `rasterize` over `units`
    ///
    /// Returns exactly one result per unit. In parallel mode results arrive
    /// in completion order.
    pub async fn dispatch<F, Fut>(
        &self,
        units: Vec<WorkUnit>,
        rasterize: F,
    ) -> Result<Vec<FetchResult>, DispatchError>
    where
        F: Fn(WorkUnit) -> Fut,
        Fut: Future<Output = Result<FetchResult, RasterizeError>> + Send + 'static,
    {
        let total = units.len();
        let progress = self.show_progress.then(|| create_progress_bar(total));
        info!(units = total, workers = self.worker_count.get(), "Dispatching work units");

        let results = if self.worker_count.get() == 1 {
            let mut results = Vec::with_capacity(total);
            for unit in units {
                let key = unit.key().to_string();
                match rasterize(unit).await {
                    Ok(result) => results.push(result),
                    Err(source) => {
                        if let Some(pb) = &progress {
                            pb.abandon_with_message(format!("{key} failed"));
                        }
                        return Err(DispatchError::Fetch { key, source });
                    }
                }
                if let Some(pb) = &progress {
                    pb.inc(1);
                }
            }
            results
        } else {
            stream::iter(units)
                .map(|unit| {
                    let key = unit.key().to_string();
                    let handle = tokio::spawn(rasterize(unit));
                    async move {
                        match handle.await {
                            Ok(Ok(result)) => result,
                            Ok(Err(e)) => {
                                warn!(key = %key, error = %e, "Work unit failed");
                                FetchResult::failed(key, e.to_string())
                            }
                            Err(e) => {
                                warn!(key = %key, error = %e, "Work unit task aborted");
                                FetchResult::failed(key, format!("task failed: {e}"))
                            }
                        }
                    }
                })
                .buffer_unordered(self.worker_count.get())
                .inspect(|_| {
                    if let Some(pb) = &progress {
                        pb.inc(1);
                    }
                })
                .collect::<Vec<_>>()
                .await
        };

        if let Some(pb) = progress {
            pb.finish_and_clear();
        }

        let summary = DispatchSummary::from_results(&results);
        info!(
            written = summary.written,
            no_data = summary.no_data,
            failed = summary.failed,
            "Dispatch complete"
        );
        Ok(results)
    }
}

/// Progress bar over the unit count
fn create_progress_bar(total: usize) -> ProgressBar {
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
            .expect("hardcoded template is valid")
            .progress_chars("#>-"),
    );
    pb.set_message("Fetching rasters");
    pb
}
