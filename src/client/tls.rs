//! TLS for pinned connections
//!
//! Anycast endpoints are addressed by IP while the certificate names the
//! service host, and candidates are frequently fronted by third parties.
//! Certificates are therefore never verified; SNI still carries the host.

use crate::error::{AppError, Result};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

pub const ALPN_HTTP1: &[u8] = b"http/1.1";
pub const ALPN_H3: &[u8] = b"h3";

/// Accepts any server certificate
#[derive(Debug)]
struct BlindVerifier {
    schemes: Vec<SignatureScheme>,
}

impl ServerCertVerifier for BlindVerifier {
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

/// Client config without certificate verification.
///
/// `tls13_only` is required for QUIC.
pub fn insecure_client_config(alpn: &[&[u8]], tls13_only: bool) -> Result<ClientConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let verifier = BlindVerifier {
        schemes: provider.signature_verification_algorithms.supported_schemes(),
    };

    let builder = ClientConfig::builder_with_provider(provider);
    let builder = if tls13_only {
        builder.with_protocol_versions(&[&rustls::version::TLS13])?
    } else {
        builder.with_safe_default_protocol_versions()?
    };

    let mut config = builder
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(verifier))
        .with_no_client_auth();
    config.alpn_protocols = alpn.iter().map(|p| p.to_vec()).collect();
    Ok(config)
}

pub fn server_name(host: &str) -> Result<ServerName<'static>> {
    ServerName::try_from(host.to_string())
        .map_err(|e| AppError::config(format!("Invalid TLS server name '{}': {}", host, e)))
}

/// Connector plus the SNI to present
#[derive(Clone)]
pub struct TlsSettings {
    connector: TlsConnector,
    server_name: ServerName<'static>,
}

impl TlsSettings {
    /// HTTP/1.1 over TLS with the given SNI
    pub fn insecure(host: &str) -> Result<Self> {
        let config = insecure_client_config(&[ALPN_HTTP1], false)?;
        Ok(Self {
            connector: TlsConnector::from(Arc::new(config)),
            server_name: server_name(host)?,
        })
    }

    pub fn server_name(&self) -> &ServerName<'static> {
        &self.server_name
    }

    /// Run the handshake over an already-dialed stream
    pub async fn wrap(&self, stream: TcpStream) -> Result<TlsStream<TcpStream>> {
        self.connector
            .connect(self.server_name.clone(), stream)
            .await
            .map_err(|e| AppError::tls(format!("handshake failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insecure_config_sets_alpn() {
        let config = insecure_client_config(&[ALPN_HTTP1], false).unwrap();
        assert_eq!(config.alpn_protocols, vec![b"http/1.1".to_vec()]);

        let quic = insecure_client_config(&[ALPN_H3], true).unwrap();
        assert_eq!(quic.alpn_protocols, vec![b"h3".to_vec()]);
    }

    #[test]
    fn test_server_name_accepts_hosts_and_ips() {
        assert!(server_name("speed.cloudflare.com").is_ok());
        assert!(server_name("104.16.1.1").is_ok());
        assert!(server_name("bad host name").is_err());
    }

    #[tokio::test]
    async fn test_handshake_against_plain_listener_fails_as_tls() {
        use tokio::io::AsyncWriteExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let _ = socket.write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n").await;
            }
        });

        let settings = TlsSettings::insecure("example.com").unwrap();
        let stream = TcpStream::connect(addr).await.unwrap();
        let err = settings.wrap(stream).await.unwrap_err();
        assert_eq!(err.category(), "TLS");
    }
}
