//! Error categorization for per-request failures.
//!
//! Failed requests are never propagated out of the runner. Instead they are
//! classified here (HTTP status class, network, timeout, TLS) so the report
//! can show what kind of failures a batch saw.

use serde::Serialize;
use std::fmt;

/// Categories of errors that can occur while issuing a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// HTTP 3xx responses. Only 2xx counts as success, and redirects are not followed.
    RedirectError,

    /// HTTP 4xx errors (client errors)
    ClientError,

    /// HTTP 5xx errors (server errors)
    ServerError,

    /// Network connectivity errors (DNS, connection refused, etc.)
    NetworkError,

    /// Request timeout errors
    TimeoutError,

    /// TLS/SSL handshake or certificate errors
    TlsError,

    /// Other/unknown errors
    OtherError,
}

impl ErrorCategory {
    /// Categorize an HTTP status code.
    ///
    /// Returns `None` for 2xx, which is the only success range.
    pub fn from_status_code(status_code: u16) -> Option<Self> {
        match status_code {
            200..=299 => None,
            300..=399 => Some(ErrorCategory::RedirectError),
            400..=499 => Some(ErrorCategory::ClientError),
            500..=599 => Some(ErrorCategory::ServerError),
            _ => Some(ErrorCategory::OtherError),
        }
    }

    /// Categorize a reqwest transport error.
    pub fn from_reqwest_error(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            return ErrorCategory::TimeoutError;
        }

        // TLS failures surface as connect errors, so look at the source
        // chain before falling back to the coarse flags. The top-level
        // message embeds the request URL and must not be matched.
        let chain = source_chain_text(error);
        if chain.contains("certificate")
            || chain.contains("tls")
            || chain.contains("ssl")
            || chain.contains("handshake")
        {
            ErrorCategory::TlsError
        } else if error.is_connect() || error.is_request() || error.is_body() {
            ErrorCategory::NetworkError
        } else if error.is_decode() {
            ErrorCategory::OtherError
        } else if error.is_redirect() {
            ErrorCategory::RedirectError
        } else if chain.contains("timed out") || chain.contains("timeout") {
            ErrorCategory::TimeoutError
        } else if chain.contains("dns")
            || chain.contains("resolve")
            || chain.contains("connection")
        {
            ErrorCategory::NetworkError
        } else {
            ErrorCategory::OtherError
        }
    }

    /// Stable label used as a report key.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorCategory::RedirectError => "redirect_error",
            ErrorCategory::ClientError => "client_error",
            ErrorCategory::ServerError => "server_error",
            ErrorCategory::NetworkError => "network_error",
            ErrorCategory::TimeoutError => "timeout_error",
            ErrorCategory::TlsError => "tls_error",
            ErrorCategory::OtherError => "other_error",
        }
    }

    /// Get a human-readable description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorCategory::RedirectError => "HTTP 3xx Redirects",
            ErrorCategory::ClientError => "HTTP 4xx Client Errors",
            ErrorCategory::ServerError => "HTTP 5xx Server Errors",
            ErrorCategory::NetworkError => "Network/Connection Errors",
            ErrorCategory::TimeoutError => "Request Timeout Errors",
            ErrorCategory::TlsError => "TLS/SSL Errors",
            ErrorCategory::OtherError => "Other/Unknown Errors",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Lower-cased text of the sources below `error`, excluding its own message.
fn source_chain_text(error: &(dyn std::error::Error + 'static)) -> String {
    let mut parts = Vec::new();
    let mut source = error.source();
    while let Some(inner) = source {
        parts.push(inner.to_string());
        source = inner.source();
    }
    parts.join(": ").to_lowercase()
}

/// Lower-cased text of an error and all of its sources.
fn error_chain_text(error: &(dyn std::error::Error + 'static)) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(inner) = source {
        text.push_str(": ");
        text.push_str(&inner.to_string());
        source = inner.source();
    }
    text.to_lowercase()
}

/// Why a single request did not succeed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestFailure {
    pub category: ErrorCategory,

    /// HTTP status code, absent for transport-level failures
    pub status_code: Option<u16>,

    pub message: String,
}

impl RequestFailure {
    /// Failure for a response that arrived with a non-2xx status.
    ///
    /// Returns `None` when the status is actually a success.
    pub fn from_status(status_code: u16, message: String) -> Option<Self> {
        ErrorCategory::from_status_code(status_code).map(|category| Self {
            category,
            status_code: Some(status_code),
            message,
        })
    }

    /// Failure for a transport-level fault. Never carries a status code.
    pub fn from_reqwest(error: &reqwest::Error) -> Self {
        Self {
            category: ErrorCategory::from_reqwest_error(error),
            status_code: None,
            message: error_chain_text(error),
        }
    }
}

impl fmt::Display for RequestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(status) = self.status_code {
            write!(
                f,
                "[{}] HTTP {}: {}",
                self.category.label(),
                status,
                self.message
            )
        } else {
            write!(f, "[{}] {}", self.category.label(), self.message)
        }
    }
}
