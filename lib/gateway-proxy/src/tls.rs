//! TLS client provisioning for TCP endpoints
//!
//! Loads CA, client certificate and key files from disk once, at handler
//! construction, into a reusable rustls client configuration.

use crate::error::{ProxyError, Result};
use gateway_core::TlsConfiguration;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, WebPkiSupportedAlgorithms};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use rustls_pemfile::{certs, read_all};
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// Build a client configuration from the files referenced by `tls`.
///
/// Every referenced file must exist and parse. Client certificate and key are
/// both required when either is given.
pub fn client_config_from_disk(tls: &TlsConfiguration) -> Result<Arc<ClientConfig>> {
    debug!("Creating TLS client configuration from disk");

    let provider = provider();
    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| ProxyError::Configuration(format!("Unsupported TLS protocol versions: {}", e)))?;

    let builder = if tls.tls_skip_verify {
        warn!("TLS server certificate verification disabled for endpoint");
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoCertVerifier::new(&provider)))
    } else {
        let roots = match &tls.tls_ca_cert {
            Some(path) => {
                let mut roots = RootCertStore::empty();
                for cert in load_certificates(&read_file(path)?, path)? {
                    roots.add(cert).map_err(|e| {
                        ProxyError::Configuration(format!(
                            "Failed to add CA certificate from {}: {}",
                            path.display(),
                            e
                        ))
                    })?;
                }
                debug!("Loaded {} CA certificate(s) from {}", roots.len(), path.display());
                roots
            }
            None => RootCertStore {
                roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
            },
        };
        builder.with_root_certificates(roots)
    };

    let config = match (&tls.tls_cert, &tls.tls_key) {
        (Some(cert_path), Some(key_path)) => {
            let chain = load_certificates(&read_file(cert_path)?, cert_path)?;
            let key = load_private_key(&read_file(key_path)?, key_path)?;
            builder
                .with_client_auth_cert(chain, key)
                .map_err(|e| ProxyError::Configuration(format!("Invalid client certificate/key pair: {}", e)))?
        }
        (None, None) => builder.with_no_client_auth(),
        _ => {
            return Err(ProxyError::Configuration(
                "Client certificate and key must be provided together".to_string(),
            ))
        }
    };

    info!(
        "TLS client configuration created (client certificate: {}, skip verify: {})",
        tls.tls_cert.is_some(),
        tls.tls_skip_verify
    );
    Ok(Arc::new(config))
}

/// Client configuration trusting the bundled public web roots
pub fn public_client_config() -> Result<Arc<ClientConfig>> {
    let roots = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    let config = ClientConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()
        .map_err(|e| ProxyError::Configuration(format!("Unsupported TLS protocol versions: {}", e)))?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(Arc::new(config))
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path)
        .map_err(|e| ProxyError::Configuration(format!("Unable to read {}: {}", path.display(), e)))
}

/// Load certificates from PEM-encoded data
pub fn load_certificates(pem_data: &[u8], origin: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let mut reader = BufReader::new(pem_data);
    let certs_vec = certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| {
            ProxyError::Configuration(format!("Failed to parse certificates in {}: {}", origin.display(), e))
        })?;

    if certs_vec.is_empty() {
        return Err(ProxyError::Configuration(format!(
            "No certificates found in {}",
            origin.display()
        )));
    }
    Ok(certs_vec)
}

/// Load the first private key from PEM-encoded data
pub fn load_private_key(pem_data: &[u8], origin: &Path) -> Result<PrivateKeyDer<'static>> {
    let mut reader = BufReader::new(pem_data);
    let items: Vec<_> = read_all(&mut reader)
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| {
            ProxyError::Configuration(format!("Failed to parse private key in {}: {}", origin.display(), e))
        })?;

    for item in items {
        match item {
            rustls_pemfile::Item::Pkcs8Key(k) => return Ok(PrivateKeyDer::Pkcs8(k)),
            rustls_pemfile::Item::Pkcs1Key(k) => return Ok(PrivateKeyDer::Pkcs1(k)),
            rustls_pemfile::Item::Sec1Key(k) => return Ok(PrivateKeyDer::Sec1(k)),
            _ => {}
        }
    }

    Err(ProxyError::Configuration(format!(
        "No private key found in {}",
        origin.display()
    )))
}

/// Accepts any server certificate. Only installed when the endpoint asks to skip verification.
#[derive(Debug)]
struct NoCertVerifier {
    algorithms: WebPkiSupportedAlgorithms,
}

impl NoCertVerifier {
    fn new(provider: &CryptoProvider) -> Self {
        Self {
            algorithms: provider.signature_verification_algorithms,
        }
    }
}

impl ServerCertVerifier for NoCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}
