//! PostgreSQL TLS support
//!
//! Builds native-tls connectors for tokio-postgres from the configured
//! `SslMode` and optional CA certificate.

use native_tls::{Certificate, TlsConnector as NativeTlsConnector, TlsConnectorBuilder};
use pgproc_core::{PgProcError, SslMode};
use postgres_native_tls::MakeTlsConnector;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Error types for TLS operations
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    /// Failed to load CA certificate
    #[error("Failed to load CA certificate from {path}: {source}")]
    CaCertLoadFailed {
        path: String,
        source: std::io::Error,
    },

    /// Invalid CA certificate format
    #[error("Invalid CA certificate format: {0}")]
    InvalidCaCert(String),

    /// TLS configuration error
    #[error("TLS configuration error: {0}")]
    ConfigurationError(String),

    /// TLS mode not supported
    #[error("TLS mode {mode:?} does not use a TLS connector")]
    UnsupportedMode { mode: SslMode },
}

impl From<TlsError> for PgProcError {
    fn from(e: TlsError) -> Self {
        PgProcError::Connection(e.to_string())
    }
}

/// Build a TLS connector for the given mode.
///
/// `prefer` and `require` encrypt without verifying the server unless a CA
/// certificate is supplied, matching libpq. `verify-ca` checks the chain but
/// not the host name, `verify-full` checks both.
pub fn build_connector(
    mode: SslMode,
    ca_cert: Option<&str>,
) -> Result<MakeTlsConnector, TlsError> {
    let mut builder = NativeTlsConnector::builder();
    let ca_cert = ca_cert.filter(|path| !path.is_empty());

    match mode {
        SslMode::Disable => return Err(TlsError::UnsupportedMode { mode }),
        SslMode::Prefer | SslMode::Require => {
            if ca_cert.is_none() {
                builder.danger_accept_invalid_certs(true);
            }
            builder.danger_accept_invalid_hostnames(true);
        }
        SslMode::VerifyCa => {
            builder.danger_accept_invalid_hostnames(true);
        }
        SslMode::VerifyFull => {}
    }

    if let Some(path) = ca_cert {
        apply_ca_cert(&mut builder, Path::new(path))?;
    }

    let connector = builder
        .build()
        .map_err(|e| TlsError::ConfigurationError(e.to_string()))?;

    debug!(mode = mode.as_str(), "TLS connector built");
    Ok(MakeTlsConnector::new(connector))
}

/// Load and apply a PEM-encoded CA certificate to the TLS builder
fn apply_ca_cert(builder: &mut TlsConnectorBuilder, path: &Path) -> Result<(), TlsError> {
    debug!(path = %path.display(), "loading CA certificate");

    let pem_data = fs::read(path).map_err(|e| TlsError::CaCertLoadFailed {
        path: path.display().to_string(),
        source: e,
    })?;

    let cert =
        Certificate::from_pem(&pem_data).map_err(|e| TlsError::InvalidCaCert(e.to_string()))?;

    builder.add_root_certificate(cert);
    Ok(())
}
