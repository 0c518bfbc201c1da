//! Result aggregation

use crate::models::{RunSummary, StepResult};

/// Reduce the per-condition results to a run summary.
///
/// A check that never ran stays `None` instead of counting as passed.
pub fn summarize(steps: &[StepResult]) -> RunSummary {
    let bandwidths = steps.iter().filter_map(|s| s.occupied_bandwidth);

    RunSummary {
        min_bandwidth: bandwidths.clone().reduce(f64::min),
        max_bandwidth: bandwidths.reduce(f64::max),
        operating_channel_pass: all_pass(steps.iter().map(|s| s.operating_channel_pass)),
        operational_band_pass: all_pass(steps.iter().map(|s| s.operational_band_pass)),
    }
}

fn all_pass(results: impl Iterator<Item = Option<bool>>) -> Option<bool> {
    results
        .flatten()
        .fold(None, |acc, pass| Some(acc.unwrap_or(true) && pass))
}
