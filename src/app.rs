//! Wires configuration, runner, statistics and report into one run.

use chrono::Local;
use thiserror::Error;
use tracing::info;

use crate::client::{build_client, ClientBuildError};
use crate::config::Config;
use crate::report::{Report, ReportConfig, ReportError, ReportFile};
use crate::request::TestSelection;
use crate::runner::RequestRunner;
use crate::stats::{calculate_statistics, Statistics};

/// Setup-time failures that abort a run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Client(#[from] ClientBuildError),

    #[error(transparent)]
    Report(#[from] ReportError),
}

/// Runs every selected test kind in order and returns one snapshot per kind.
pub async fn execute_tests(
    runner: &mut RequestRunner,
    selection: TestSelection,
    num_requests: usize,
) -> Vec<Statistics> {
    let mut all = Vec::with_capacity(selection.kinds().len());
    for &kind in selection.kinds() {
        info!(test_kind = %kind, num_requests, "Running test");
        let batch = runner.run_batch(kind, num_requests).await;

        info!(test_kind = %kind, "Calculating statistics...");
        let stats = calculate_statistics(&batch);
        display_statistics(&stats);
        all.push(stats);
    }
    all
}

fn display_statistics(stats: &Statistics) {
    for line in stats.format_summary().lines() {
        info!("{}", line);
    }
}

/// Full run: open the report file, build the TLS client, run the batches,
/// persist the report. Every setup fault surfaces before the first request.
pub async fn run(config: &Config) -> Result<Report, RunError> {
    let output = ReportFile::create(&config.output_path)?;
    let client = match build_client(&config.to_client_config()) {
        Ok(client) => client,
        Err(e) => {
            output.discard();
            return Err(e.into());
        }
    };
    let mut runner = RequestRunner::new(client, config.runner_config());

    let statistics = execute_tests(&mut runner, config.test_type, config.num_requests).await;

    let report = Report::new(ReportConfig::from(config), &statistics, Local::now());
    output.write(&report)?;
    Ok(report)
}
