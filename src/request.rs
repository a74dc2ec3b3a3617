//! Request shapes and per-request result types.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::RequestFailure;

/// Header carrying the storage container the request targets.
pub const CONTAINER_HEADER: &str = "x-sap-filecontainer";

/// Header carrying the per-request identifier.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

const WEBHDFS_PREFIX: &str = "/webhdfs/v1";

/// Which kind of request a batch issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TestKind {
    /// `GET /webhdfs/v1/?op=WHOAMI`
    #[serde(rename = "whoami")]
    Identity,

    /// `GET /webhdfs/v1{file_path}?op=OPEN`
    #[serde(rename = "file_open")]
    FileFetch,
}

impl TestKind {
    /// Key under which this kind's statistics are reported.
    pub fn report_key(&self) -> &'static str {
        match self {
            TestKind::Identity => "whoami",
            TestKind::FileFetch => "file_open",
        }
    }

    /// Banner title used in the console summary.
    pub fn title(&self) -> &'static str {
        match self {
            TestKind::Identity => "WHOAMI",
            TestKind::FileFetch => "FILE OPEN",
        }
    }
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.report_key())
    }
}

/// Which test kinds a run should execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestSelection {
    #[default]
    Whoami,
    FileOpen,
    Both,
}

impl TestSelection {
    /// Kinds to run, in execution order.
    pub fn kinds(&self) -> &'static [TestKind] {
        match self {
            TestSelection::Whoami => &[TestKind::Identity],
            TestSelection::FileOpen => &[TestKind::FileFetch],
            TestSelection::Both => &[TestKind::Identity, TestKind::FileFetch],
        }
    }

    pub fn includes(&self, kind: TestKind) -> bool {
        self.kinds().contains(&kind)
    }
}

impl FromStr for TestSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "whoami" | "identity" => Ok(TestSelection::Whoami),
            "open" | "file" | "file_open" | "file_fetch" => Ok(TestSelection::FileOpen),
            "both" | "all" => Ok(TestSelection::Both),
            other => Err(format!(
                "unknown test type '{}'. Expected one of: whoami, file_open, both",
                other
            )),
        }
    }
}

impl fmt::Display for TestSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestSelection::Whoami => f.write_str("whoami"),
            TestSelection::FileOpen => f.write_str("file_open"),
            TestSelection::Both => f.write_str("both"),
        }
    }
}

/// Builds the path-and-query for a request of the given kind.
///
/// `file_path` is only consulted for [`TestKind::FileFetch`]; a missing
/// leading slash is added.
pub fn request_target(kind: TestKind, file_path: Option<&str>) -> String {
    match kind {
        TestKind::Identity => format!("{}/?op=WHOAMI", WEBHDFS_PREFIX),
        TestKind::FileFetch => {
            let path = file_path.unwrap_or("/");
            if path.starts_with('/') {
                format!("{}{}?op=OPEN", WEBHDFS_PREFIX, path)
            } else {
                format!("{}/{}?op=OPEN", WEBHDFS_PREFIX, path)
            }
        }
    }
}

/// Builds a request identifier that is unique within one runner.
///
/// The sequence number guarantees uniqueness inside a batch; the random
/// suffix keeps identifiers distinct across runs in server-side logs.
pub fn generate_request_id(kind: TestKind, sequence: u64) -> String {
    let suffix: u64 = rand::thread_rng().gen();
    format!("{}-{:06}-{:016x}", kind.report_key(), sequence, suffix)
}

/// What a single round trip produced.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestOutcome {
    Success {
        status_code: u16,
        body: String,
    },
    Failure {
        failure: RequestFailure,
        /// Body of a non-2xx response, absent for transport failures
        body: Option<String>,
    },
}

/// One timed request. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestResult {
    pub request_id: String,
    pub test_kind: TestKind,

    /// Wall-clock duration in milliseconds, recorded even on failure
    pub duration_ms: f64,

    /// True iff the status code is in [200, 300)
    pub success: bool,
    pub status_code: Option<u16>,
    pub response_body: Option<String>,
    pub is_warmup: bool,
    pub error: Option<RequestFailure>,
}

impl RequestResult {
    /// Flattens an outcome into the record kept in a batch.
    pub fn from_outcome(
        request_id: String,
        test_kind: TestKind,
        duration_ms: f64,
        is_warmup: bool,
        outcome: RequestOutcome,
    ) -> Self {
        match outcome {
            RequestOutcome::Success { status_code, body } => Self {
                request_id,
                test_kind,
                duration_ms,
                success: true,
                status_code: Some(status_code),
                response_body: Some(body),
                is_warmup,
                error: None,
            },
            RequestOutcome::Failure { failure, body } => Self {
                request_id,
                test_kind,
                duration_ms,
                success: false,
                status_code: failure.status_code,
                response_body: body,
                is_warmup,
                error: Some(failure),
            },
        }
    }
}
