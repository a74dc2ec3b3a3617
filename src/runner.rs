//! Sequential request runner.
//!
//! One warmup request is issued first, then the measured batch. Every request
//! is awaited to completion (body fully read) before the next one starts, and
//! a failed request never affects the ones after it.

use reqwest::header::CONTENT_TYPE;
use tokio::time::{Duration, Instant};
use tracing::{debug, error, info, info_span, Instrument};

use crate::errors::RequestFailure;
use crate::request::{
    generate_request_id, request_target, RequestOutcome, RequestResult, TestKind,
    CONTAINER_HEADER, REQUEST_ID_HEADER,
};
use crate::utils::truncate_body;

/// Progress is logged after every this many measured requests.
const PROGRESS_INTERVAL: usize = 100;

/// Failed requests listed individually in the debug summary.
const DEBUG_FAILURE_SAMPLE: usize = 5;

/// Per-run settings for the runner.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Scheme, host and port, e.g. `https://files.example.com:443`
    pub base_url: String,
    pub container: String,
    pub file_path: Option<String>,

    /// Bytes of each response body retained in the result. The full body is
    /// always read for timing.
    pub max_body_bytes: usize,
    pub debug: bool,
}

/// Outcome of one warmup + measured batch for a single test kind.
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub test_kind: TestKind,

    /// Results in issuance order; the warmup, if any, comes first.
    pub results: Vec<RequestResult>,

    /// Successful non-warmup requests
    pub successful_requests: usize,

    /// Elapsed time of the measured batch, excluding the warmup
    pub total_duration: Duration,

    /// Duration of the warmup request, measured separately
    pub warmup_duration_ms: Option<f64>,
}

impl BatchResult {
    /// Results that count towards statistics.
    pub fn measured(&self) -> impl Iterator<Item = &RequestResult> {
        self.results.iter().filter(|r| !r.is_warmup)
    }
}

/// Issues timed requests against one endpoint with a shared TLS client.
pub struct RequestRunner {
    client: reqwest::Client,
    config: RunnerConfig,
    next_sequence: u64,
}

impl RequestRunner {
    pub fn new(client: reqwest::Client, config: RunnerConfig) -> Self {
        Self {
            client,
            config,
            next_sequence: 0,
        }
    }

    /// Runs one warmup request followed by `num_requests` measured requests.
    pub async fn run_batch(&mut self, kind: TestKind, num_requests: usize) -> BatchResult {
        let span = info_span!("batch", test_kind = %kind);
        self.run_batch_inner(kind, num_requests)
            .instrument(span)
            .await
    }

    async fn run_batch_inner(&mut self, kind: TestKind, num_requests: usize) -> BatchResult {
        let mut results = Vec::with_capacity(num_requests.saturating_add(1));

        info!("Performing warmup request...");
        let warmup = self.execute(kind, true).await;
        info!(
            duration_ms = warmup.duration_ms,
            success = warmup.success,
            status_code = ?warmup.status_code,
            "Warmup request completed"
        );
        let warmup_duration_ms = Some(warmup.duration_ms);
        results.push(warmup);

        info!(num_requests, "Starting batch");
        let mut successful_requests = 0usize;
        let batch_start = Instant::now();

        for i in 0..num_requests {
            if i > 0 && i % PROGRESS_INTERVAL == 0 {
                info!(completed = i, total = num_requests, "Progress");
            }

            let result = self.execute(kind, false).await;
            if result.success {
                successful_requests += 1;
            } else if self.config.debug {
                debug!(
                    request = i + 1,
                    status_code = ?result.status_code,
                    "Request failed"
                );
            }
            results.push(result);
        }

        let total_duration = batch_start.elapsed();

        let batch = BatchResult {
            test_kind: kind,
            results,
            successful_requests,
            total_duration,
            warmup_duration_ms,
        };

        if self.config.debug {
            log_failure_summary(&batch);
        }

        info!(
            successful = successful_requests,
            total = num_requests,
            elapsed_secs = total_duration.as_secs_f64(),
            "Batch completed"
        );

        batch
    }

    /// Issues exactly one request and times it end to end.
    ///
    /// Never fails: transport faults become a failed result whose duration
    /// runs up to the point of failure.
    pub async fn execute(&mut self, kind: TestKind, is_warmup: bool) -> RequestResult {
        let request_id = generate_request_id(kind, self.next_sequence);
        self.next_sequence += 1;

        let target = request_target(kind, self.config.file_path.as_deref());
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), target);

        let start = Instant::now();
        let outcome = self.send(&url, &request_id).await;
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

        match &outcome {
            RequestOutcome::Success { status_code, body } if self.config.debug => {
                debug!(
                    url = %url,
                    request_id = %request_id,
                    container = %self.config.container,
                    status_code,
                    body = %body,
                    duration_ms,
                    "Request succeeded"
                );
            }
            RequestOutcome::Success { .. } => {}
            RequestOutcome::Failure { failure, body } => {
                if failure.status_code.is_none() {
                    error!(
                        request_id = %request_id,
                        error = %failure,
                        duration_ms,
                        "Request error"
                    );
                } else if self.config.debug {
                    debug!(
                        url = %url,
                        request_id = %request_id,
                        error = %failure,
                        body = body.as_deref().unwrap_or(""),
                        duration_ms,
                        "Request returned non-success status"
                    );
                }
            }
        }

        RequestResult::from_outcome(request_id, kind, duration_ms, is_warmup, outcome)
    }

    async fn send(&self, url: &str, request_id: &str) -> RequestOutcome {
        let response = match self
            .client
            .get(url)
            .header(CONTAINER_HEADER, &self.config.container)
            .header(REQUEST_ID_HEADER, request_id)
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                return RequestOutcome::Failure {
                    failure: RequestFailure::from_reqwest(&e),
                    body: None,
                }
            }
        };

        let status = response.status();
        let body = match read_body(response, self.config.max_body_bytes).await {
            Ok(body) => body,
            Err(e) => {
                return RequestOutcome::Failure {
                    failure: RequestFailure::from_reqwest(&e),
                    body: None,
                }
            }
        };

        let reason = status.canonical_reason().unwrap_or("Unknown status").to_string();
        match RequestFailure::from_status(status.as_u16(), reason) {
            None => RequestOutcome::Success {
                status_code: status.as_u16(),
                body,
            },
            Some(failure) => RequestOutcome::Failure {
                failure,
                body: Some(body),
            },
        }
    }
}

/// Reads the whole body, keeping at most `max_bytes` of it.
async fn read_body(
    mut response: reqwest::Response,
    max_bytes: usize,
) -> Result<String, reqwest::Error> {
    let mut kept = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        let room = max_bytes.saturating_sub(kept.len());
        if room > 0 {
            kept.extend_from_slice(&chunk[..chunk.len().min(room)]);
        }
    }
    let text = String::from_utf8_lossy(&kept);
    Ok(truncate_body(&text, max_bytes).to_string())
}

fn log_failure_summary(batch: &BatchResult) {
    let failed: Vec<&RequestResult> = batch.measured().filter(|r| !r.success).collect();
    if failed.is_empty() {
        return;
    }

    debug!(failed = failed.len(), "Total failed requests");
    for (i, req) in failed.iter().take(DEBUG_FAILURE_SAMPLE).enumerate() {
        let body = req.response_body.as_deref().unwrap_or("");
        debug!(
            index = i + 1,
            request_id = %req.request_id,
            status_code = ?req.status_code,
            response = truncate_body(body, 200),
            "Failed request"
        );
    }
    if failed.len() > DEBUG_FAILURE_SAMPLE {
        debug!(
            remaining = failed.len() - DEBUG_FAILURE_SAMPLE,
            "Additional failures not shown"
        );
    }
}
