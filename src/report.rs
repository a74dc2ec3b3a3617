//! JSON report persisted at the end of a run.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::Config;
use crate::request::TestSelection;
use crate::stats::Statistics;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to create output directory '{path}': {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write results to '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize results: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Echo of the configuration a report was produced with.
#[derive(Debug, Clone, Serialize)]
pub struct ReportConfig {
    pub files_rest_api: String,
    pub container: String,
    pub port: u16,
    pub num_requests: usize,
    pub test_type: TestSelection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
}

impl From<&Config> for ReportConfig {
    fn from(config: &Config) -> Self {
        Self {
            files_rest_api: config.files_rest_api.clone(),
            container: config.container.clone(),
            port: config.port,
            num_requests: config.num_requests,
            test_type: config.test_type,
            file_path: config.file_path.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub test_time: String,
    pub config: ReportConfig,

    /// Keyed by test kind (`whoami`, `file_open`)
    pub statistics: BTreeMap<&'static str, Statistics>,
}

impl Report {
    pub fn new(config: ReportConfig, statistics: &[Statistics], now: DateTime<Local>) -> Self {
        let statistics = statistics
            .iter()
            .map(|s| (s.test_kind.report_key(), s.clone()))
            .collect();
        Self {
            test_time: now.format("%Y-%m-%d_%H-%M-%S").to_string(),
            config,
            statistics,
        }
    }
}

/// Destination of the report, opened before the first request so an
/// unwritable location aborts the run instead of losing its measurements.
#[derive(Debug)]
pub struct ReportFile {
    path: PathBuf,
    file: File,
}

impl ReportFile {
    /// Creates parent directories as needed and opens `path` for writing.
    pub fn create(path: &Path) -> Result<Self, ReportError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| ReportError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let file = File::create(path).map_err(|source| ReportError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Opened report file");

        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Writes the report as pretty JSON and closes the file.
    pub fn write(mut self, report: &Report) -> Result<(), ReportError> {
        let json = serde_json::to_string_pretty(report)?;
        self.file
            .write_all(json.as_bytes())
            .and_then(|()| self.file.flush())
            .map_err(|source| ReportError::Write {
                path: self.path.clone(),
                source,
            })?;

        info!(path = %self.path.display(), "Results saved");
        Ok(())
    }

    /// Removes the still-empty file after a setup failure.
    pub fn discard(self) {
        let ReportFile { path, file } = self;
        drop(file);
        if let Err(e) = fs::remove_file(&path) {
            debug!(path = %path.display(), error = %e, "Could not remove unused report file");
        }
    }
}
