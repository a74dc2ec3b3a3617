use std::fs;
use std::io::Cursor;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

/// Configuration for building the HTTP client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub insecure_skip_verify: bool,
    pub client_cert_path: Option<String>,
    pub client_key_path: Option<String>,
    pub request_timeout: Duration,
}

/// Setup-time failures while building the TLS client. All of these are fatal.
#[derive(Debug, Error)]
pub enum ClientBuildError {
    #[error("Failed to read {kind} file '{path}': {source}")]
    Read {
        kind: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No PEM certificates found in '{0}'")]
    NoCertificates(PathBuf),

    #[error("Failed to parse PEM certificates from '{path}': {source}")]
    InvalidCertificate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No private key found in '{0}'. Expected a PEM-encoded PKCS#8, PKCS#1 or SEC1 key.")]
    NoPrivateKey(PathBuf),

    #[error("Failed to parse private key from '{path}': {source}")]
    InvalidPrivateKey {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Client certificate is set but the key path is missing")]
    MissingKey,

    #[error("Client key is set but the certificate path is missing")]
    MissingCertificate,

    #[error("Failed to build TLS client: {0}")]
    Build(#[from] reqwest::Error),
}

/// Builds the reqwest client shared read-only by every request in a run.
///
/// Connection pooling is disabled so every request pays for its own TCP
/// connect and TLS handshake.
pub fn build_client(config: &ClientConfig) -> Result<reqwest::Client, ClientBuildError> {
    let mut client_builder = reqwest::Client::builder()
        .use_rustls_tls()
        .timeout(config.request_timeout)
        .pool_max_idle_per_host(0)
        .redirect(reqwest::redirect::Policy::none());

    client_builder = configure_mtls(
        client_builder,
        config.client_cert_path.as_deref(),
        config.client_key_path.as_deref(),
    )?;

    if config.insecure_skip_verify {
        warn!("insecure_skip_verify is set: server certificate and hostname are NOT verified");
        client_builder = client_builder
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true);
    }

    debug!(
        timeout = ?config.request_timeout,
        insecure_skip_verify = config.insecure_skip_verify,
        "Building HTTP client"
    );

    Ok(client_builder.build()?)
}

fn configure_mtls(
    client_builder: reqwest::ClientBuilder,
    cert_path: Option<&str>,
    key_path: Option<&str>,
) -> Result<reqwest::ClientBuilder, ClientBuildError> {
    match (cert_path, key_path) {
        (Some(cert_path), Some(key_path)) => {
            let identity = load_identity(cert_path, key_path)?;
            info!(cert_path, key_path, "Configured mTLS client identity");
            Ok(client_builder.identity(identity))
        }
        (Some(_), None) => Err(ClientBuildError::MissingKey),
        (None, Some(_)) => Err(ClientBuildError::MissingCertificate),
        (None, None) => Ok(client_builder),
    }
}

/// Reads and validates a PEM certificate chain and private key, then joins
/// them into a single reqwest identity.
pub fn load_identity(cert_path: &str, key_path: &str) -> Result<reqwest::Identity, ClientBuildError> {
    let cert_pem_buf = fs::read(cert_path).map_err(|source| ClientBuildError::Read {
        kind: "client certificate",
        path: PathBuf::from(cert_path),
        source,
    })?;
    let key_pem_buf = fs::read(key_path).map_err(|source| ClientBuildError::Read {
        kind: "client key",
        path: PathBuf::from(key_path),
        source,
    })?;

    validate_certificates(&cert_pem_buf, cert_path)?;
    validate_private_key(&key_pem_buf, key_path)?;

    let mut combined_pem_buf = Vec::with_capacity(cert_pem_buf.len() + key_pem_buf.len() + 1);
    combined_pem_buf.extend_from_slice(&cert_pem_buf);
    if !cert_pem_buf.ends_with(b"\n") && !key_pem_buf.starts_with(b"\n") {
        combined_pem_buf.push(b'\n');
    }
    combined_pem_buf.extend_from_slice(&key_pem_buf);

    Ok(reqwest::Identity::from_pem(&combined_pem_buf)?)
}

fn validate_certificates(pem: &[u8], path: &str) -> Result<(), ClientBuildError> {
    let mut cursor = Cursor::new(pem);
    let mut found = 0usize;
    for cert in rustls_pemfile::certs(&mut cursor) {
        cert.map_err(|source| ClientBuildError::InvalidCertificate {
            path: PathBuf::from(path),
            source,
        })?;
        found += 1;
    }
    if found == 0 {
        return Err(ClientBuildError::NoCertificates(PathBuf::from(path)));
    }
    Ok(())
}

fn validate_private_key(pem: &[u8], path: &str) -> Result<(), ClientBuildError> {
    let mut cursor = Cursor::new(pem);
    match rustls_pemfile::private_key(&mut cursor) {
        Ok(Some(_)) => Ok(()),
        Ok(None) => Err(ClientBuildError::NoPrivateKey(PathBuf::from(path))),
        Err(source) => Err(ClientBuildError::InvalidPrivateKey {
            path: PathBuf::from(path),
            source,
        }),
    }
}
