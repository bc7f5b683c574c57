pub mod assembly;
pub mod basecall;
pub mod filtering;
pub mod polishing;

use std::future::Future;
use futures::stream::{self, StreamExt};
use log::{error, info, warn};
use crate::config::defs::PipelineError;
use crate::utils::sample::Sample;


/// Result of one sample's trip through a stage.
#[derive(Debug)]
pub struct SampleReport {
    pub name: String,
    pub result: Result<Sample, PipelineError>,
}

/// Per-sample outcomes of a stage, in sample-name order.
#[derive(Debug)]
pub struct RunSummary {
    pub stage: String,
    pub reports: Vec<SampleReport>,
}

impl RunSummary {
    pub fn failures(&self) -> impl Iterator<Item = &SampleReport> {
        self.reports.iter().filter(|r| r.result.is_err())
    }

    pub fn succeeded(&self) -> usize {
        self.reports.len() - self.failures().count()
    }

    pub fn log(&self) {
        info!(
            "{} summary: {} of {} sample(s) succeeded",
            self.stage,
            self.succeeded(),
            self.reports.len()
        );
        for report in &self.reports {
            match &report.result {
                Ok(sample) => info!("  ok      {}", sample),
                Err(e) => error!("  FAILED  {}: {}", report.name, e),
            }
        }
    }

    /// Err(SamplesFailed) if any sample failed.
    pub fn into_result(self) -> Result<Vec<Sample>, PipelineError> {
        let total = self.reports.len();
        let failed = self.failures().count();
        if failed > 0 {
            return Err(PipelineError::SamplesFailed { failed, total });
        }
        Ok(self.reports.into_iter().filter_map(|r| r.result.ok()).collect())
    }
}


/// Runs `process` over every sample with at most `jobs` samples in flight.
/// A failing sample never stops the others.
///
/// # Arguments
///
/// * `stage` - Stage name for the summary.
/// * `jobs` - Concurrent samples, at least 1.
/// * `samples` - Samples to process.
/// * `process` - Per-sample work; its steps run sequentially.
///
/// # Returns
/// RunSummary sorted by sample name.
pub async fn run_samples<F, Fut>(stage: &str, jobs: usize, samples: Vec<Sample>, process: F) -> RunSummary
where
    F: Fn(Sample) -> Fut,
    Fut: Future<Output = Result<Sample, PipelineError>>,
{
    if samples.is_empty() {
        warn!("{}: no samples to process", stage);
    }
    let mut reports: Vec<SampleReport> = stream::iter(samples)
        .map(|sample| {
            let name = sample.name.clone();
            let fut = process(sample);
            async move {
                info!("{}: starting {}", name, stage);
                let result = fut.await;
                if let Err(e) = &result {
                    error!("{}: {}", name, e);
                }
                SampleReport { name, result }
            }
        })
        .buffer_unordered(jobs.max(1))
        .collect()
        .await;
    reports.sort_by(|a, b| a.name.cmp(&b.name));
    RunSummary { stage: stage.to_string(), reports }
}
