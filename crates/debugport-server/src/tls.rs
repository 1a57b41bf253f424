// ============================================
// File: crates/debugport-server/src/tls.rs
// ============================================
//! # TLS Setup
//!
//! ## Creation Reason
//! The listener optionally wraps accepted sockets in TLS. Certificate
//! loading and acceptor construction are isolated here so the listener
//! only ever sees a ready [`TlsAcceptor`].
//!
//! ## Main Functionality
//! - Load a PEM certificate chain and private key from disk
//! - Generate an ephemeral self-signed certificate for development
//! - Build a `tokio_rustls::TlsAcceptor` from either source
//!
//! ## ⚠️ Important Note for Next Developer
//! Self-signed certificates are regenerated on every start; clients
//! that pin the certificate must re-pin after a restart. Production
//! deployments should always configure `cert_file`/`key_file`.
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio_rustls::rustls::ServerConfig as RustlsConfig;
use tokio_rustls::TlsAcceptor;
use tracing::{info, warn};

use crate::config::TlsConfig;
use crate::error::{Result, ServerError};

/// Builds a TLS acceptor from the configuration, or `None` when TLS
/// is disabled.
pub fn build_acceptor(config: &TlsConfig) -> Result<Option<TlsAcceptor>> {
    if !config.enabled {
        return Ok(None);
    }

    let (certs, key) = if config.self_signed {
        warn!("Using an ephemeral self-signed certificate; clients cannot verify this server");
        generate_self_signed()?
    } else {
        let cert_file = config
            .cert_file
            .as_deref()
            .ok_or_else(|| ServerError::tls("cert_file is required when TLS is enabled"))?;
        let key_file = config
            .key_file
            .as_deref()
            .ok_or_else(|| ServerError::tls("key_file is required when TLS is enabled"))?;
        load_pem(Path::new(cert_file), Path::new(key_file))?
    };

    let tls_config = RustlsConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ServerError::tls(format!("invalid certificate or key: {e}")))?;

    info!("TLS enabled");
    Ok(Some(TlsAcceptor::from(Arc::new(tls_config))))
}

/// Loads a certificate chain and private key from PEM files.
fn load_pem(
    cert_path: &Path,
    key_path: &Path,
) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)> {
    let cert_file = File::open(cert_path).map_err(|e| {
        ServerError::tls(format!("cannot open {}: {e}", cert_path.display()))
    })?;
    let certs: Vec<CertificateDer<'static>> =
        rustls_pemfile::certs(&mut BufReader::new(cert_file))
            .collect::<std::io::Result<Vec<_>>>()
            .map_err(|e| {
                ServerError::tls(format!("cannot parse {}: {e}", cert_path.display()))
            })?;
    if certs.is_empty() {
        return Err(ServerError::tls(format!(
            "no certificates found in {}",
            cert_path.display()
        )));
    }

    let key_file = File::open(key_path).map_err(|e| {
        ServerError::tls(format!("cannot open {}: {e}", key_path.display()))
    })?;
    let key = rustls_pemfile::private_key(&mut BufReader::new(key_file))
        .map_err(|e| ServerError::tls(format!("cannot parse {}: {e}", key_path.display())))?
        .ok_or_else(|| {
            ServerError::tls(format!("no private key found in {}", key_path.display()))
        })?;

    Ok((certs, key))
}

/// Generates an ephemeral self-signed certificate for `localhost`.
fn generate_self_signed() -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)> {
    let certified = rcgen::generate_simple_self_signed(vec![
        "localhost".to_string(),
        "127.0.0.1".to_string(),
    ])
    .map_err(|e| ServerError::tls(format!("certificate generation failed: {e}")))?;

    let cert = certified.cert.der().clone();
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
        certified.key_pair.serialize_der(),
    ));
    Ok((vec![cert], key))
}
