pub mod app;
pub mod cli;
pub mod client;
pub mod config;
pub mod config_validation;
pub mod errors;
pub mod logging;
pub mod report;
pub mod request;
pub mod runner;
pub mod stats;
pub mod utils;
