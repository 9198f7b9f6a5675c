//! Mutual TLS configuration and certificate loading.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::server::WebPkiClientVerifier;
use tokio_rustls::rustls::{self, RootCertStore, ServerConfig};
use tokio_rustls::TlsAcceptor;

use crate::config::TlsConfig;

/// Error type for TLS setup.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("no TLS material configured and plaintext is not enabled")]
    NotConfigured,

    #[error("read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("no certificates found in {0}")]
    NoCertificates(String),

    #[error("no private key found in {0}")]
    NoPrivateKey(String),

    #[error("client CA bundle {0} holds no usable certificates")]
    EmptyClientCa(String),

    #[error("client verifier: {0}")]
    Verifier(#[from] rustls::server::VerifierBuilderError),

    #[error("tls config: {0}")]
    Rustls(#[from] rustls::Error),
}

fn open(path: &str) -> Result<BufReader<File>, TlsError> {
    File::open(Path::new(path))
        .map(BufReader::new)
        .map_err(|source| TlsError::Io {
            path: path.to_string(),
            source,
        })
}

fn load_certs(path: &str) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let certs = rustls_pemfile::certs(&mut open(path)?)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Io {
            path: path.to_string(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates(path.to_string()));
    }
    Ok(certs)
}

fn load_key(path: &str) -> Result<PrivateKeyDer<'static>, TlsError> {
    rustls_pemfile::private_key(&mut open(path)?)
        .map_err(|source| TlsError::Io {
            path: path.to_string(),
            source,
        })?
        .ok_or_else(|| TlsError::NoPrivateKey(path.to_string()))
}

/// Build an acceptor that requires client certificates chaining to the configured CA.
pub fn load_mtls_config(config: &TlsConfig) -> Result<TlsAcceptor, TlsError> {
    let cert_chain = load_certs(&config.cert_path)?;
    let key = load_key(&config.key_path)?;

    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(load_certs(&config.ca_cert_path)?);
    if added == 0 {
        return Err(TlsError::EmptyClientCa(config.ca_cert_path.clone()));
    }
    if ignored > 0 {
        tracing::warn!(path = %config.ca_cert_path, ignored, "Skipped unparsable client CA certificates");
    }

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), Arc::clone(&provider))
        .build()?;

    let server_config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_client_cert_verifier(verifier)
        .with_single_cert(cert_chain, key)?;

    tracing::info!(
        cert = %config.cert_path,
        client_ca = %config.ca_cert_path,
        "Mutual TLS configured"
    );
    Ok(TlsAcceptor::from(Arc::new(server_config)))
}
