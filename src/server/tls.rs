// TLS module
// Loads PEM credentials into a rustls acceptor with per-protocol ALPN

use rustls_pemfile::{certs, private_key};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;

use crate::config::{Protocol, TlsConfig};
use crate::error::StartupError;

/// Build the acceptor for `https` (`http/1.1` only) or `http2`
/// (`h2`, then `http/1.1`).
pub fn load_acceptor(tls: &TlsConfig, protocol: Protocol) -> Result<TlsAcceptor, StartupError> {
    let cert_file = tls
        .cert_file
        .as_deref()
        .ok_or_else(|| StartupError::Tls("tls.cert_file is not set".to_string()))?;
    let key_file = tls
        .key_file
        .as_deref()
        .ok_or_else(|| StartupError::Tls("tls.key_file is not set".to_string()))?;

    let cert_chain = load_certs(cert_file)?;
    let key = load_key(key_file)?;

    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(cert_chain, key)
        .map_err(|e| StartupError::Tls(e.to_string()))?;

    config.alpn_protocols = match protocol {
        Protocol::Http2 => vec![b"h2".to_vec(), b"http/1.1".to_vec()],
        Protocol::Http | Protocol::Https => vec![b"http/1.1".to_vec()],
    };

    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn open(path: &Path) -> Result<BufReader<File>, StartupError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| StartupError::Tls(format!("{}: {e}", path.display())))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, StartupError> {
    let chain = certs(&mut open(path)?)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| StartupError::Tls(format!("{}: {e}", path.display())))?;

    if chain.is_empty() {
        return Err(StartupError::Tls(format!(
            "{}: no certificates found",
            path.display()
        )));
    }
    Ok(chain)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, StartupError> {
    private_key(&mut open(path)?)
        .map_err(|e| StartupError::Tls(format!("{}: {e}", path.display())))?
        .ok_or_else(|| StartupError::Tls(format!("{}: no private key found", path.display())))
}
