//! Client TLS configuration.
//!
//! Strict servers get ordinary certificate verification against either
//! the webpki root set or a caller-supplied CA bundle; the peer
//! certificate must match the configured hostname or the handshake
//! fails. Opportunistic servers get no verification at all: the
//! connection is encrypted but unauthenticated by design.

use crate::identity::DotServerConfig;
use crate::{Result, TransportError};
use rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use std::io::BufReader;
use std::net::IpAddr;
use std::sync::Arc;

/// Builds the client configuration for one server.
pub fn client_config(server: &DotServerConfig) -> Result<Arc<ClientConfig>> {
    let config = if server.hostname.is_some() {
        let roots = root_store(server.ca_pem.as_deref())?;
        ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth()
    } else {
        ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate::new()))
            .with_no_client_auth()
    };
    Ok(Arc::new(config))
}

/// The SNI / verification name for one server.
pub fn server_name(server: &DotServerConfig) -> Result<ServerName<'static>> {
    match &server.hostname {
        Some(hostname) => ServerName::try_from(hostname.clone())
            .map_err(|_| TransportError::TlsConfig(format!("invalid server name {hostname:?}"))),
        None => Ok(ServerName::IpAddress(pki_ip(server.addr.ip()))),
    }
}

fn pki_ip(ip: IpAddr) -> rustls::pki_types::IpAddr {
    rustls::pki_types::IpAddr::from(ip)
}

fn root_store(ca_pem: Option<&str>) -> Result<RootCertStore> {
    let mut roots = RootCertStore::empty();
    match ca_pem {
        Some(pem) => {
            let mut reader = BufReader::new(pem.as_bytes());
            let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut reader)
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| TransportError::TlsConfig(format!("bad CA bundle: {e}")))?;
            if certs.is_empty() {
                return Err(TransportError::TlsConfig("empty CA bundle".into()));
            }
            for cert in certs {
                roots
                    .add(cert)
                    .map_err(|e| TransportError::TlsConfig(format!("bad CA certificate: {e}")))?;
            }
        }
        None => {
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        }
    }
    Ok(roots)
}

/// Verifier for opportunistic mode: accepts any certificate and skips
/// the name check entirely.
#[derive(Debug)]
struct AcceptAnyCertificate {
    schemes: Vec<SignatureScheme>,
}

impl AcceptAnyCertificate {
    fn new() -> Self {
        let schemes = CryptoProvider::get_default()
            .map(|provider| {
                provider
                    .signature_verification_algorithms
                    .supported_schemes()
            })
            .unwrap_or_else(|| {
                rustls::crypto::ring::default_provider()
                    .signature_verification_algorithms
                    .supported_schemes()
            });
        Self { schemes }
    }
}

impl ServerCertVerifier for AcceptAnyCertificate {
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
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.schemes.clone()
    }
}
