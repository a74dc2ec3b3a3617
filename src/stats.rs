//! Latency statistics over a completed batch.
//!
//! Only successful, non-warmup requests contribute latency samples. Throughput
//! and success rate are computed over every non-warmup request, successful or
//! not. A batch with no successful samples yields a snapshot without latency
//! fields rather than an error.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::error;

use crate::request::TestKind;
use crate::runner::BatchResult;

/// Read-only statistics snapshot for one test kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    #[serde(skip)]
    pub test_kind: TestKind,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub median_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub std_dev_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentile_95_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentile_99_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_ms: Option<f64>,

    pub requests_per_second: f64,

    /// Percentage of non-warmup requests that succeeded, 0 to 100
    pub success_rate: f64,
    pub total_requests: usize,
    pub successful_requests: usize,
    pub failed_requests: usize,
    pub total_duration_seconds: f64,

    /// Never folded into any other field
    pub warmup_duration_ms: Option<f64>,

    /// Failed non-warmup requests per error category label
    pub errors_by_category: BTreeMap<&'static str, usize>,
}

impl Statistics {
    /// True when at least one latency sample was available.
    pub fn has_latency(&self) -> bool {
        self.mean_ms.is_some()
    }

    /// Formats the console summary block.
    pub fn format_summary(&self) -> String {
        let rule = "=".repeat(50);
        let mut lines = vec![
            rule.clone(),
            format!("HDLF API {} PERFORMANCE TEST RESULTS", self.test_kind.title()),
            rule.clone(),
            format!("Total Requests: {}", self.total_requests),
            format!("Successful Requests: {}", self.successful_requests),
            format!("Success Rate: {:.2}%", self.success_rate),
            format!(
                "Total Test Duration: {:.2} seconds",
                self.total_duration_seconds
            ),
            format!("Requests Per Second: {:.2}", self.requests_per_second),
        ];

        if let Some(warmup) = self.warmup_duration_ms {
            lines.push(format!("Warmup Request: {:.2} ms", warmup));
        }

        let latency = [
            ("Mean", self.mean_ms),
            ("Median", self.median_ms),
            ("Standard Deviation", self.std_dev_ms),
            ("95th Percentile", self.percentile_95_ms),
            ("99th Percentile", self.percentile_99_ms),
            ("Min", self.min_ms),
            ("Max", self.max_ms),
        ];
        if self.has_latency() {
            lines.push(String::new());
            lines.push("Response Time Statistics (milliseconds):".to_string());
            for (label, value) in latency {
                if let Some(v) = value {
                    lines.push(format!("{}: {:.2} ms", label, v));
                }
            }
        } else {
            lines.push("No successful requests; latency statistics unavailable".to_string());
        }

        if !self.errors_by_category.is_empty() {
            lines.push(String::new());
            lines.push("Failures by category:".to_string());
            for (label, count) in &self.errors_by_category {
                lines.push(format!("{}: {}", label, count));
            }
        }

        lines.push(rule);
        lines.join("\n")
    }
}

/// Computes the statistics snapshot for a batch.
pub fn calculate_statistics(batch: &BatchResult) -> Statistics {
    let mut total_requests = 0usize;
    let mut durations = Vec::with_capacity(batch.results.len());
    let mut errors_by_category: BTreeMap<&'static str, usize> = BTreeMap::new();

    for result in batch.measured() {
        total_requests += 1;
        if result.success {
            durations.push(result.duration_ms);
        } else if let Some(failure) = &result.error {
            *errors_by_category.entry(failure.category.label()).or_insert(0) += 1;
        }
    }

    let successful_requests = durations.len();
    let elapsed_secs = batch.total_duration.as_secs_f64();

    let requests_per_second = if elapsed_secs > 0.0 && elapsed_secs.is_finite() {
        total_requests as f64 / elapsed_secs
    } else {
        0.0
    };

    let success_rate = if total_requests > 0 {
        successful_requests as f64 / total_requests as f64 * 100.0
    } else {
        0.0
    };

    let mut stats = Statistics {
        test_kind: batch.test_kind,
        mean_ms: None,
        median_ms: None,
        std_dev_ms: None,
        percentile_95_ms: None,
        percentile_99_ms: None,
        min_ms: None,
        max_ms: None,
        requests_per_second,
        success_rate,
        total_requests,
        successful_requests,
        failed_requests: total_requests - successful_requests,
        total_duration_seconds: elapsed_secs,
        warmup_duration_ms: batch.warmup_duration_ms,
        errors_by_category,
    };

    if durations.is_empty() {
        error!(
            test_kind = %batch.test_kind,
            "No successful requests to calculate statistics from!"
        );
        return stats;
    }

    durations.sort_by(f64::total_cmp);
    let mean_value = mean(&durations);

    stats.mean_ms = Some(mean_value);
    stats.median_ms = percentile(&durations, 50.0);
    stats.std_dev_ms = Some(population_std_dev(&durations, mean_value));
    stats.percentile_95_ms = percentile(&durations, 95.0);
    stats.percentile_99_ms = percentile(&durations, 99.0);
    stats.min_ms = durations.first().copied();
    stats.max_ms = durations.last().copied();
    stats
}

/// Arithmetic mean. Returns 0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation around `mean`.
pub fn population_std_dev(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let variance = values
        .iter()
        .map(|v| {
            let d = v - mean;
            d * d
        })
        .sum::<f64>()
        / values.len() as f64;
    variance.sqrt()
}

/// Percentile of an ascending-sorted slice, interpolating linearly between
/// the two closest ranks (rank = p/100 * (n - 1)).
///
/// Returns `None` for an empty slice. `p` is clamped to [0, 100].
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let rank = (p.clamp(0.0, 100.0) / 100.0) * last as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let lo = *sorted.get(lower)?;
    let hi = *sorted.get(upper)?;
    Some(lo + (hi - lo) * (rank - lower as f64))
}
