use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use webhdfs_latency::app::run;
use webhdfs_latency::cli::{Cli, CONFIG_HELP};
use webhdfs_latency::config::Config;
use webhdfs_latency::logging::init_logging;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let log_handle = init_logging();

    info!("Loading configuration...");
    let config = match Config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "Configuration error");
            eprintln!("\n{}", CONFIG_HELP);
            return ExitCode::FAILURE;
        }
    };

    log_handle.set_debug(config.debug);
    config.log_summary();

    match run(&config).await {
        Ok(_) => {
            info!("Test completed successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Test failed");
            ExitCode::FAILURE
        }
    }
}
