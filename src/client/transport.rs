//! Transport opening: plain TCP or TLS over TCP.
//!
//! The engine never opens sockets itself; it asks its [`Connector`] for a
//! byte stream. [`TcpConnector`] is the default. Tests substitute in-memory
//! connectors.

use super::RemoteAddr;
use async_trait::async_trait;
use std::io;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tracing::{debug, info, warn};

/// A bidirectional byte stream the engine can split and drive.
pub trait Stream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> Stream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

pub type BoxedStream = Box<dyn Stream>;

/// Opens the transport for a remote address.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, addr: &RemoteAddr) -> io::Result<BoxedStream>;
}

/// Default connector: TCP with keepalive, upgraded to TLS when requested.
///
/// TLS verifies the server against the platform's native roots. The root
/// store is loaded on the first TLS connect and reused afterwards.
#[derive(Default)]
pub struct TcpConnector {
    tls: OnceLock<TlsConnector>,
}

impl TcpConnector {
    pub fn new() -> Self {
        Self::default()
    }

    fn tls_connector(&self) -> &TlsConnector {
        self.tls.get_or_init(|| {
            let mut roots = RootCertStore::empty();
            let certs = rustls_native_certs::load_native_certs();
            for cert in certs.certs {
                if let Err(e) = roots.add(cert) {
                    warn!("Failed to add root cert: {}", e);
                }
            }
            for e in &certs.errors {
                warn!("Error loading native certs: {}", e);
            }

            let config = ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth();
            TlsConnector::from(Arc::new(config))
        })
    }

    fn enable_keepalive(stream: &TcpStream) -> io::Result<()> {
        use socket2::{SockRef, TcpKeepalive};

        let sock = SockRef::from(stream);
        let keepalive = TcpKeepalive::new()
            .with_time(Duration::from_secs(120))
            .with_interval(Duration::from_secs(30));

        sock.set_tcp_keepalive(&keepalive)
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, addr: &RemoteAddr) -> io::Result<BoxedStream> {
        let tcp = TcpStream::connect((addr.hostname.as_str(), addr.port)).await?;
        if let Err(e) = Self::enable_keepalive(&tcp) {
            warn!("failed to enable TCP keepalive: {}", e);
        }
        if let Err(e) = tcp.set_nodelay(true) {
            debug!("failed to set TCP_NODELAY: {}", e);
        }

        if !addr.tls {
            return Ok(Box::new(tcp));
        }

        let server_name = ServerName::try_from(addr.hostname.clone())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let tls = self.tls_connector().connect(server_name, tcp).await?;
        info!(hostname = %addr.hostname, "TLS handshake completed");

        Ok(Box::new(tls))
    }
}
