//! TLS configuration and certificate loading.

use std::path::{Path, PathBuf};

use axum_server::tls_rustls::RustlsConfig;
use thiserror::Error;

use crate::config::TlsConfig;

/// Error loading certificate or key material.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("certificate file not found: {0:?}")]
    CertificateNotFound(PathBuf),

    #[error("private key file not found: {0:?}")]
    KeyNotFound(PathBuf),

    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no PEM certificates found in {0:?}")]
    NoCertificates(PathBuf),

    #[error("no PEM private key found in {0:?}")]
    NoPrivateKey(PathBuf),

    #[error("invalid TLS material: {0}")]
    Invalid(String),
}

/// PEM-encoded certificate chain and private key, validated but not parsed further.
#[derive(Clone)]
pub struct PemPair {
    pub cert: Vec<u8>,
    pub key: Vec<u8>,
}

impl std::fmt::Debug for PemPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PemPair")
            .field("cert_len", &self.cert.len())
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Select the process-wide rustls crypto provider.
///
/// Both axum-server and tonic pull rustls in, with different default
/// providers enabled, so rustls cannot pick one on its own.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// Read and sanity-check a certificate/key pair.
pub async fn read_pem_pair(cert_path: &Path, key_path: &Path) -> Result<PemPair, TlsError> {
    if !cert_path.exists() {
        return Err(TlsError::CertificateNotFound(cert_path.to_path_buf()));
    }
    if !key_path.exists() {
        return Err(TlsError::KeyNotFound(key_path.to_path_buf()));
    }

    let cert = tokio::fs::read(cert_path).await.map_err(|source| TlsError::Io {
        path: cert_path.to_path_buf(),
        source,
    })?;
    let key = tokio::fs::read(key_path).await.map_err(|source| TlsError::Io {
        path: key_path.to_path_buf(),
        source,
    })?;

    let mut reader = cert.as_slice();
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Io {
            path: cert_path.to_path_buf(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates(cert_path.to_path_buf()));
    }

    let mut reader = key.as_slice();
    match rustls_pemfile::private_key(&mut reader) {
        Ok(Some(_)) => {}
        Ok(None) => return Err(TlsError::NoPrivateKey(key_path.to_path_buf())),
        Err(source) => {
            return Err(TlsError::Io {
                path: key_path.to_path_buf(),
                source,
            })
        }
    }

    Ok(PemPair { cert, key })
}

/// Load TLS configuration for an axum-server listener.
pub async fn load_tls_config(tls: &TlsConfig) -> Result<RustlsConfig, TlsError> {
    install_crypto_provider();
    let pair = read_pem_pair(Path::new(&tls.cert_path), Path::new(&tls.key_path)).await?;
    RustlsConfig::from_pem(pair.cert, pair.key)
        .await
        .map_err(|e| TlsError::Invalid(e.to_string()))
}

/// Load a server identity for a tonic listener.
pub async fn load_grpc_identity(tls: &TlsConfig) -> Result<tonic::transport::Identity, TlsError> {
    install_crypto_provider();
    let pair = read_pem_pair(Path::new(&tls.cert_path), Path::new(&tls.key_path)).await?;
    Ok(tonic::transport::Identity::from_pem(pair.cert, pair.key))
}
