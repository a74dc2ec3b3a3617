use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local};
use serde::Deserialize;
use thiserror::Error;
use tokio::time::Duration;
use tracing::{debug, error, info};

use crate::client::ClientConfig;
use crate::config_validation::{
    DurationValidator, RangeValidator, ValidationContext, ValidationError,
};
use crate::request::{TestKind, TestSelection};
use crate::runner::RunnerConfig;
use crate::utils::parse_bool_flag;

/// Config file consulted when neither `--config` nor `CONFIG_FILE` is given.
pub const DEFAULT_CONFIG_FILE: &str = "/config/config.json";

const DEFAULT_NUM_REQUESTS: usize = 1000;
const MAX_NUM_REQUESTS: u64 = 10_000_000;
const DEFAULT_PORT: u16 = 443;
const DEFAULT_OUTPUT_PATH: &str = "/data/results.json";
const DEFAULT_REQUEST_TIMEOUT: &str = "30s";
const DEFAULT_MAX_BODY_BYTES: usize = 4096;

/// Errors that abort a run before any request is issued.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value '{value}' for {var}: {message}")]
    InvalidValue {
        var: &'static str,
        value: String,
        message: String,
    },

    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    FileParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid configuration: {0}")]
    Validation(#[from] ValidationError),
}

/// Configuration as read from one source, before defaults and validation.
///
/// Field names double as the JSON config file keys.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RawConfig {
    pub files_rest_api: Option<String>,
    pub container: Option<String>,
    pub crt_path: Option<String>,
    pub key_path: Option<String>,
    pub num_requests: Option<usize>,
    pub port: Option<u16>,
    pub output_path: Option<String>,
    pub debug: Option<bool>,
    pub file_path: Option<String>,
    pub test_type: Option<String>,
    pub insecure_skip_verify: Option<bool>,
    pub request_timeout: Option<String>,
    pub max_body_bytes: Option<usize>,
}

impl RawConfig {
    /// Reads every known environment variable. Empty values count as unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`RawConfig::from_env`] with an injectable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(RawConfig {
            files_rest_api: get("FILES_REST_API"),
            container: get("CONTAINER"),
            crt_path: get("CRT_PATH"),
            key_path: get("KEY_PATH"),
            num_requests: parse_env_number("NUM_REQUESTS", get("NUM_REQUESTS"))?,
            port: parse_env_number("API_PORT", get("API_PORT"))?,
            output_path: get("OUTPUT_PATH"),
            debug: parse_env_bool("DEBUG", get("DEBUG"))?,
            file_path: get("FILE_PATH"),
            test_type: get("TEST_TYPE"),
            insecure_skip_verify: parse_env_bool(
                "INSECURE_SKIP_VERIFY",
                get("INSECURE_SKIP_VERIFY"),
            )?,
            request_timeout: get("REQUEST_TIMEOUT"),
            max_body_bytes: parse_env_number("MAX_BODY_BYTES", get("MAX_BODY_BYTES"))?,
        })
    }

    /// Reads a JSON config file. Empty strings count as unset.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let raw: RawConfig =
            serde_json::from_str(&contents).map_err(|source| ConfigError::FileParse {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(raw.without_blank_strings())
    }

    fn without_blank_strings(self) -> RawConfig {
        let keep = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        RawConfig {
            files_rest_api: keep(self.files_rest_api),
            container: keep(self.container),
            crt_path: keep(self.crt_path),
            key_path: keep(self.key_path),
            output_path: keep(self.output_path),
            file_path: keep(self.file_path),
            test_type: keep(self.test_type),
            request_timeout: keep(self.request_timeout),
            ..self
        }
    }

    /// Fills every field left unset in `self` from `fallback`.
    pub fn or(self, fallback: RawConfig) -> RawConfig {
        RawConfig {
            files_rest_api: self.files_rest_api.or(fallback.files_rest_api),
            container: self.container.or(fallback.container),
            crt_path: self.crt_path.or(fallback.crt_path),
            key_path: self.key_path.or(fallback.key_path),
            num_requests: self.num_requests.or(fallback.num_requests),
            port: self.port.or(fallback.port),
            output_path: self.output_path.or(fallback.output_path),
            debug: self.debug.or(fallback.debug),
            file_path: self.file_path.or(fallback.file_path),
            test_type: self.test_type.or(fallback.test_type),
            insecure_skip_verify: self.insecure_skip_verify.or(fallback.insecure_skip_verify),
            request_timeout: self.request_timeout.or(fallback.request_timeout),
            max_body_bytes: self.max_body_bytes.or(fallback.max_body_bytes),
        }
    }
}

fn parse_env_number<T>(var: &'static str, value: Option<String>) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .map(|v| {
            v.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
                var,
                message: e.to_string(),
                value: v,
            })
        })
        .transpose()
}

fn parse_env_bool(var: &'static str, value: Option<String>) -> Result<Option<bool>, ConfigError> {
    value
        .map(|v| {
            parse_bool_flag(&v).map_err(|message| ConfigError::InvalidValue {
                var,
                value: v,
                message,
            })
        })
        .transpose()
}

/// Validated configuration for a run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Host name of the file-storage REST endpoint
    pub files_rest_api: String,
    pub container: String,
    pub crt_path: String,
    pub key_path: String,
    pub num_requests: usize,
    pub port: u16,

    /// Final, already timestamped, report path
    pub output_path: PathBuf,
    pub debug: bool,
    pub file_path: Option<String>,
    pub test_type: TestSelection,

    /// Skip server certificate and hostname verification. Off unless set explicitly.
    pub insecure_skip_verify: bool,
    pub request_timeout: Duration,
    pub max_body_bytes: usize,
}

impl Config {
    /// Loads configuration from the environment with the JSON config file as fallback.
    ///
    /// The file is optional: a missing file is skipped and an unreadable one is
    /// logged and ignored, since it only fills gaps the environment left.
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let env_config = RawConfig::from_env()?;

        let file_path = config_file
            .map(Path::to_path_buf)
            .or_else(|| env::var("CONFIG_FILE").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let file_config = if file_path.exists() {
            match RawConfig::from_file(&file_path) {
                Ok(c) => {
                    debug!(path = %file_path.display(), "Loaded config file");
                    c
                }
                Err(e) => {
                    error!(error = %e, "Error loading config file");
                    RawConfig::default()
                }
            }
        } else {
            RawConfig::default()
        };

        Self::from_raw(env_config.or(file_config), Local::now())
    }

    /// Applies defaults, validates, and stamps the output path with `now`.
    pub fn from_raw(raw: RawConfig, now: DateTime<Local>) -> Result<Self, ConfigError> {
        let mut ctx = ValidationContext::new();

        let files_rest_api = ctx.require(raw.files_rest_api, "files_rest_api");
        let container = ctx.require(raw.container, "container");
        let crt_path = ctx.require(raw.crt_path, "crt_path");
        let key_path = ctx.require(raw.key_path, "key_path");

        let test_type = match raw.test_type.as_deref() {
            Some(s) => ctx.check(TestSelection::from_str(s).map_err(|message| {
                ValidationError::InvalidFormat {
                    field: "test_type".to_string(),
                    message,
                }
            })),
            None => Some(TestSelection::default()),
        };

        if test_type.is_some_and(|t| t.includes(TestKind::FileFetch)) {
            ctx.require(raw.file_path.as_ref(), "file_path");
        }

        let num_requests = raw.num_requests.unwrap_or(DEFAULT_NUM_REQUESTS);
        ctx.check(RangeValidator::validate_u64(
            num_requests as u64,
            1,
            MAX_NUM_REQUESTS,
            "num_requests",
        ));

        let port = raw.port.unwrap_or(DEFAULT_PORT);
        ctx.check(RangeValidator::validate_u64(port as u64, 1, 65535, "port"));

        let request_timeout = ctx.check(DurationValidator::parse_positive(
            raw.request_timeout
                .as_deref()
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            "request_timeout",
        ));

        let output_path = ctx.check(stamp_output_path(
            raw.output_path.as_deref().unwrap_or(DEFAULT_OUTPUT_PATH),
            now,
        ));

        ctx.into_result()?;

        // into_result() returned Ok, so every check above produced a value.
        match (
            files_rest_api,
            container,
            crt_path,
            key_path,
            test_type,
            request_timeout,
            output_path,
        ) {
            (
                Some(files_rest_api),
                Some(container),
                Some(crt_path),
                Some(key_path),
                Some(test_type),
                Some(request_timeout),
                Some(output_path),
            ) => Ok(Config {
                files_rest_api,
                container,
                crt_path,
                key_path,
                num_requests,
                port,
                output_path,
                debug: raw.debug.unwrap_or(false),
                file_path: raw.file_path,
                test_type,
                insecure_skip_verify: raw.insecure_skip_verify.unwrap_or(false),
                request_timeout,
                max_body_bytes: raw.max_body_bytes.unwrap_or(DEFAULT_MAX_BODY_BYTES),
            }),
            _ => Err(ValidationError::Multiple("incomplete configuration".to_string()).into()),
        }
    }

    /// Base URL every request path is appended to.
    pub fn base_url(&self) -> String {
        format!("https://{}:{}", self.files_rest_api, self.port)
    }

    /// Creates a ClientConfig from this Config.
    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig {
            insecure_skip_verify: self.insecure_skip_verify,
            client_cert_path: Some(self.crt_path.clone()),
            client_key_path: Some(self.key_path.clone()),
            request_timeout: self.request_timeout,
        }
    }

    /// Creates the RunnerConfig for the request runner.
    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            base_url: self.base_url(),
            container: self.container.clone(),
            file_path: self.file_path.clone(),
            max_body_bytes: self.max_body_bytes,
            debug: self.debug,
        }
    }

    /// Logs the configuration summary.
    pub fn log_summary(&self) {
        info!(
            target_host = %self.files_rest_api,
            port = self.port,
            container = %self.container,
            num_requests = self.num_requests,
            test_type = %self.test_type,
            file_path = self.file_path.as_deref().unwrap_or("-"),
            request_timeout = ?self.request_timeout,
            insecure_skip_verify = self.insecure_skip_verify,
            output_path = %self.output_path.display(),
            "Starting API performance test"
        );
    }
}

/// Adds a timestamp to the report path.
///
/// A path containing `%` is treated as a strftime pattern. Otherwise
/// `_YYYYmmdd_HHMMSS` is inserted before the extension.
pub fn stamp_output_path(path: &str, now: DateTime<Local>) -> Result<PathBuf, ValidationError> {
    if path.contains('%') {
        let items: Vec<Item<'_>> = StrftimeItems::new(path).collect();
        if items.iter().any(|item| matches!(item, Item::Error)) {
            return Err(ValidationError::InvalidFormat {
                field: "output_path".to_string(),
                message: format!("invalid strftime pattern '{}'", path),
            });
        }
        return Ok(PathBuf::from(
            now.format_with_items(items.into_iter()).to_string(),
        ));
    }

    let timestamp = now.format("%Y%m%d_%H%M%S");
    let original = Path::new(path);
    let stamped = match (original.file_stem(), original.extension()) {
        (Some(stem), Some(ext)) => original.with_file_name(format!(
            "{}_{}.{}",
            stem.to_string_lossy(),
            timestamp,
            ext.to_string_lossy()
        )),
        _ => PathBuf::from(format!("{}_{}", path, timestamp)),
    };
    info!(path = %stamped.display(), "Added timestamp to output path");
    Ok(stamped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashMap;

    fn fixed_now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap()
    }

    fn complete_raw() -> RawConfig {
        RawConfig {
            files_rest_api: Some("files.example.com".to_string()),
            container: Some("c-123".to_string()),
            crt_path: Some("/certs/client.crt".to_string()),
            key_path: Some("/certs/client.key".to_string()),
            ..RawConfig::default()
        }
    }

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_applied() {
        let config = Config::from_raw(complete_raw(), fixed_now()).unwrap();
        assert_eq!(config.num_requests, 1000);
        assert_eq!(config.port, 443);
        assert_eq!(config.test_type, TestSelection::Whoami);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.max_body_bytes, 4096);
        assert!(!config.debug);
        assert!(!config.insecure_skip_verify);
        assert_eq!(
            config.output_path,
            PathBuf::from("/data/results_20240305_140709.json")
        );
    }

    #[test]
    fn all_missing_required_fields_are_reported() {
        let err = Config::from_raw(RawConfig::default(), fixed_now()).unwrap_err();
        let msg = err.to_string();
        for field in ["files_rest_api", "container", "crt_path", "key_path"] {
            assert!(msg.contains(field), "'{}' missing from: {}", field, msg);
        }
    }

    #[test]
    fn file_fetch_requires_file_path() {
        let raw = RawConfig {
            test_type: Some("both".to_string()),
            ..complete_raw()
        };
        let err = Config::from_raw(raw, fixed_now()).unwrap_err();
        assert!(err.to_string().contains("file_path"));
    }

    #[test]
    fn zero_requests_is_rejected() {
        let raw = RawConfig {
            num_requests: Some(0),
            ..complete_raw()
        };
        assert!(matches!(
            Config::from_raw(raw, fixed_now()),
            Err(ConfigError::Validation(ValidationError::OutOfRange { .. }))
        ));
    }

    #[test]
    fn oversized_request_count_is_rejected() {
        let raw = RawConfig {
            num_requests: Some(usize::MAX),
            ..complete_raw()
        };
        assert!(matches!(
            Config::from_raw(raw, fixed_now()),
            Err(ConfigError::Validation(ValidationError::OutOfRange { .. }))
        ));
    }

    #[test]
    fn overflowing_timeout_is_a_validation_error() {
        let raw = RawConfig {
            request_timeout: Some("6000000000000000h".to_string()),
            ..complete_raw()
        };
        assert!(matches!(
            Config::from_raw(raw, fixed_now()),
            Err(ConfigError::Validation(ValidationError::InvalidFormat { .. }))
        ));
    }

    #[test]
    fn blank_file_values_count_as_unset() {
        let raw = RawConfig {
            file_path: Some(String::new()),
            test_type: Some("file_open".to_string()),
            ..complete_raw()
        }
        .without_blank_strings();
        assert_eq!(raw.file_path, None);

        let err = Config::from_raw(raw, fixed_now()).unwrap_err();
        assert!(err.to_string().contains("file_path"), "{}", err);
    }

    #[test]
    fn unknown_test_type_is_rejected() {
        let raw = RawConfig {
            test_type: Some("upload".to_string()),
            ..complete_raw()
        };
        assert!(Config::from_raw(raw, fixed_now()).is_err());
    }

    #[test]
    fn env_lookup_parses_typed_values() {
        let raw = RawConfig::from_lookup(lookup_from(&[
            ("FILES_REST_API", "files.example.com"),
            ("NUM_REQUESTS", "25"),
            ("API_PORT", "8443"),
            ("DEBUG", "yes"),
            ("INSECURE_SKIP_VERIFY", "1"),
            ("CONTAINER", ""),
        ]))
        .unwrap();

        assert_eq!(raw.files_rest_api.as_deref(), Some("files.example.com"));
        assert_eq!(raw.num_requests, Some(25));
        assert_eq!(raw.port, Some(8443));
        assert_eq!(raw.debug, Some(true));
        assert_eq!(raw.insecure_skip_verify, Some(true));
        assert_eq!(raw.container, None, "empty values count as unset");
    }

    #[test]
    fn env_lookup_rejects_bad_numbers() {
        let err = RawConfig::from_lookup(lookup_from(&[("API_PORT", "https")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                var: "API_PORT",
                ..
            }
        ));
    }

    #[test]
    fn env_lookup_rejects_unrecognised_booleans() {
        let err =
            RawConfig::from_lookup(lookup_from(&[("INSECURE_SKIP_VERIFY", "on")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                var: "INSECURE_SKIP_VERIFY",
                ..
            }
        ));

        let raw = RawConfig::from_lookup(lookup_from(&[("DEBUG", "No")])).unwrap();
        assert_eq!(raw.debug, Some(false));
    }

    #[test]
    fn env_values_win_over_file_values() {
        let env = RawConfig {
            container: Some("from-env".to_string()),
            ..RawConfig::default()
        };
        let file = RawConfig {
            container: Some("from-file".to_string()),
            num_requests: Some(50),
            ..RawConfig::default()
        };
        let merged = env.or(file);
        assert_eq!(merged.container.as_deref(), Some("from-env"));
        assert_eq!(merged.num_requests, Some(50));
    }

    #[test]
    fn stamp_inserts_timestamp_before_extension() {
        assert_eq!(
            stamp_output_path("/out/run.json", fixed_now()).unwrap(),
            PathBuf::from("/out/run_20240305_140709.json")
        );
        assert_eq!(
            stamp_output_path("/out/run", fixed_now()).unwrap(),
            PathBuf::from("/out/run_20240305_140709")
        );
    }

    #[test]
    fn stamp_formats_strftime_patterns() {
        assert_eq!(
            stamp_output_path("/out/%Y-%m-%d.json", fixed_now()).unwrap(),
            PathBuf::from("/out/2024-03-05.json")
        );
        assert!(stamp_output_path("/out/report%", fixed_now()).is_err());
    }

    #[test]
    fn client_config_carries_identity_paths() {
        let config = Config::from_raw(complete_raw(), fixed_now()).unwrap();
        let client = config.to_client_config();
        assert_eq!(client.client_cert_path.as_deref(), Some("/certs/client.crt"));
        assert_eq!(client.client_key_path.as_deref(), Some("/certs/client.key"));
        assert_eq!(config.base_url(), "https://files.example.com:443");
    }
}
