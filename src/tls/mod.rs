//! Mutual-TLS client material, loaded once from PEM files and shared by the
//! REST client and the WebSocket connector.

use anyhow::{Context, Result};
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

/// rustls client config with the CA bundle as the trust root and the
/// client certificate presented for mutual TLS. Used by the WebSocket
/// connector.
pub fn websocket_tls_config(
    cert_path: &Path,
    key_path: &Path,
    ca_bundle_path: &Path,
) -> Result<Arc<rustls::ClientConfig>> {
    let mut roots = rustls::RootCertStore::empty();
    for cert in read_certs(ca_bundle_path)? {
        roots
            .add(cert)
            .with_context(|| "Invalid certificate in CA bundle")?;
    }

    let certs = read_certs(cert_path)?;
    let key = read_private_key(key_path)?;

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_client_auth_cert(certs, key)
        .with_context(|| "Failed to build client TLS config")?;
    Ok(Arc::new(config))
}

/// reqwest client authenticated with the same cert/key/CA material.
pub fn http_client(
    cert_path: &Path,
    key_path: &Path,
    ca_bundle_path: &Path,
) -> Result<reqwest::Client> {
    let mut identity_pem = std::fs::read(cert_path)
        .with_context(|| format!("Failed to read client cert {}", cert_path.display()))?;
    identity_pem.push(b'\n');
    identity_pem.extend(
        std::fs::read(key_path)
            .with_context(|| format!("Failed to read client key {}", key_path.display()))?,
    );
    let identity = reqwest::Identity::from_pem(&identity_pem)
        .with_context(|| "Failed to parse client identity PEM")?;

    let ca_pem = std::fs::read(ca_bundle_path)
        .with_context(|| format!("Failed to read CA bundle {}", ca_bundle_path.display()))?;
    let roots = reqwest::Certificate::from_pem_bundle(&ca_pem)
        .with_context(|| "Failed to parse CA bundle PEM")?;

    let mut builder = reqwest::Client::builder()
        .identity(identity)
        .connect_timeout(std::time::Duration::from_secs(10))
        .timeout(std::time::Duration::from_secs(30));
    for root in roots {
        builder = builder.add_root_certificate(root);
    }
    builder.build().with_context(|| "Failed to build HTTP client")
}

fn read_certs(path: &Path) -> Result<Vec<rustls::pki_types::CertificateDer<'static>>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open certificate file {}", path.display()))?;
    let certs: Vec<_> = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<std::io::Result<_>>()
        .with_context(|| format!("Failed to parse certificates from {}", path.display()))?;
    if certs.is_empty() {
        anyhow::bail!("No certificates found in {}", path.display());
    }
    Ok(certs)
}

fn read_private_key(path: &Path) -> Result<rustls::pki_types::PrivateKeyDer<'static>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open key file {}", path.display()))?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .with_context(|| format!("Failed to parse private key from {}", path.display()))?
        .with_context(|| format!("No private key found in {}", path.display()))
}
