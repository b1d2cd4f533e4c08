//! TLS connector for the server socket.

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tracing::{debug, warn};

use crate::config::ConnectOptions;
use crate::error::{ApolloError, Result};

/// Opens TCP connections and wraps them in TLS.
#[derive(Clone)]
pub struct TlsConnector {
    inner: tokio_rustls::TlsConnector,
    verify: bool,
}

impl TlsConnector {
    /// Connector verifying against the webpki roots, or accepting any
    /// certificate when `reject_unauthorized` is false.
    pub fn new(reject_unauthorized: bool) -> Result<Self> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let builder = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| ApolloError::Tls(format!("Failed to set protocol versions: {}", e)))?;

        let config = if reject_unauthorized {
            let mut roots = RootCertStore::empty();
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            builder.with_root_certificates(roots).with_no_client_auth()
        } else {
            warn!("Server certificate verification is disabled");
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate))
                .with_no_client_auth()
        };

        Ok(Self {
            inner: tokio_rustls::TlsConnector::from(Arc::new(config)),
            verify: reject_unauthorized,
        })
    }

    /// Whether server certificates are verified.
    pub fn verifies_certificates(&self) -> bool {
        self.verify
    }

    /// Open the socket described by `options` and complete the TLS handshake.
    ///
    /// # Errors
    ///
    /// [`ApolloError::Connect`] if the TCP connection fails,
    /// [`ApolloError::Tls`] if the server name is invalid or the TLS
    /// handshake fails.
    pub async fn connect(&self, options: &ConnectOptions) -> Result<TlsStream<TcpStream>> {
        let server_name = ServerName::try_from(options.tls_server_name().to_string())
            .map_err(|_| ApolloError::Tls(format!("Invalid server name: {}", options.tls_server_name())))?;

        let tcp = TcpStream::connect((options.host.as_str(), options.port))
            .await
            .map_err(ApolloError::Connect)?;
        tcp.set_nodelay(true).map_err(ApolloError::Connect)?;
        debug!(host = %options.host, port = options.port, "TCP connection opened");

        let stream = self
            .inner
            .connect(server_name, tcp)
            .await
            .map_err(|e| ApolloError::Tls(e.to_string()))?;
        debug!("TLS session established");
        Ok(stream)
    }
}

/// Accepts any server certificate.
#[derive(Debug)]
struct AcceptAnyCertificate;

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
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
