use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::rustls::crypto::ring;
use tokio_rustls::rustls::pki_types::CertificateDer;
use tracing::{debug, warn};

use crate::error::Error;
use crate::server::client::{Client, ClientStream, CloseHandle};
use crate::server::listener::Listener;

pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Builds an acceptor from a PEM certificate chain and a PEM private key.
pub fn acceptor_from_pem(cert_pem: &[u8], key_pem: &[u8]) -> crate::Result<TlsAcceptor> {
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut &cert_pem[..])
        .collect::<Result<_, _>>()
        .map_err(|e| Error::Certificate(format!("failed to parse certificate chain: {e}")))?;
    if certs.is_empty() {
        return Err(Error::Certificate("no certificate found".to_string()));
    }

    let key = rustls_pemfile::private_key(&mut &key_pem[..])
        .map_err(|e| Error::Certificate(format!("failed to parse private key: {e}")))?
        .ok_or_else(|| Error::Certificate("no private key found".to_string()))?;

    let config = ServerConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Certificate(e.to_string()))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| Error::Certificate(e.to_string()))?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

pub async fn load_acceptor(cert_path: &Path, key_path: &Path) -> crate::Result<TlsAcceptor> {
    let cert = tokio::fs::read(cert_path).await.map_err(|e| {
        Error::Certificate(format!("cannot read {}: {e}", cert_path.display()))
    })?;
    let key = tokio::fs::read(key_path).await.map_err(|e| {
        Error::Certificate(format!("cannot read {}: {e}", key_path.display()))
    })?;

    acceptor_from_pem(&cert, &key)
}

/// Wraps a client so that its stream is TLS.
///
/// The handshake runs inside [`Client::open_stream`], on the connection's
/// own task, and never inside the accept loop.
pub struct TlsClient {
    inner: Box<dyn Client>,
    acceptor: TlsAcceptor,
    timeout: Duration,
}

impl TlsClient {
    pub fn new(inner: Box<dyn Client>, acceptor: TlsAcceptor, timeout: Duration) -> Self {
        Self {
            inner,
            acceptor,
            timeout,
        }
    }

    /// Runs the server side of the handshake, giving up at `deadline`.
    ///
    /// On timeout the underlying client is closed before the error returns.
    pub async fn authenticate_as_server(&mut self, deadline: Instant) -> crate::Result<ClientStream> {
        let raw = self.inner.open_stream().await?;
        let remote_addr = self.inner.remote_addr();

        match tokio::time::timeout_at(deadline, self.acceptor.accept(raw)).await {
            Ok(Ok(stream)) => {
                debug!(remote_addr = %remote_addr, "TLS handshake complete");
                Ok(Box::new(stream))
            }
            Ok(Err(e)) => {
                warn!(remote_addr = %remote_addr, error = %e, "TLS handshake failed");
                Err(Error::Tls(e))
            }
            Err(_) => {
                warn!(remote_addr = %remote_addr, timeout = ?self.timeout, "TLS handshake timed out");
                self.inner.close();
                Err(Error::HandshakeTimeout(self.timeout))
            }
        }
    }
}

#[async_trait]
impl Client for TlsClient {
    fn remote_addr(&self) -> SocketAddr {
        self.inner.remote_addr()
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    fn close_handle(&self) -> CloseHandle {
        self.inner.close_handle()
    }

    fn close(&self) -> bool {
        self.inner.close()
    }

    async fn open_stream(&mut self) -> crate::Result<ClientStream> {
        let deadline = Instant::now() + self.timeout;
        self.authenticate_as_server(deadline).await
    }
}

/// Hands out every accepted client wrapped in a [`TlsClient`].
pub struct TlsListener<L> {
    inner: L,
    acceptor: TlsAcceptor,
    timeout: Duration,
}

impl<L: Listener> TlsListener<L> {
    pub fn new(inner: L, acceptor: TlsAcceptor) -> Self {
        Self {
            inner,
            acceptor,
            timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl<L: Listener> Listener for TlsListener<L> {
    async fn accept(&self) -> io::Result<Box<dyn Client>> {
        let client = self.inner.accept().await?;
        Ok(Box::new(TlsClient::new(
            client,
            self.acceptor.clone(),
            self.timeout,
        )))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}
