use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::net::{TcpListener, ToSocketAddrs};
use tracing::{debug, info};

use crate::server::client::{Client, TcpClient};

/// Source of connected clients.
#[async_trait]
pub trait Listener: Send + Sync {
    async fn accept(&self) -> io::Result<Box<dyn Client>>;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// Plain TCP listener.
#[derive(Debug)]
pub struct TcpListenerAdapter {
    inner: TcpListener,
}

impl TcpListenerAdapter {
    pub async fn bind(addr: impl ToSocketAddrs) -> io::Result<Self> {
        let inner = TcpListener::bind(addr).await?;
        info!(address = %inner.local_addr()?, "Listener bound");
        Ok(Self { inner })
    }

    pub fn from_listener(listener: TcpListener) -> Self {
        Self { inner: listener }
    }
}

#[async_trait]
impl Listener for TcpListenerAdapter {
    async fn accept(&self) -> io::Result<Box<dyn Client>> {
        let (socket, peer) = self.inner.accept().await?;
        debug!(remote_addr = %peer, "Accepted connection");

        if let Err(e) = socket.set_nodelay(true) {
            debug!(remote_addr = %peer, error = %e, "Could not set TCP_NODELAY");
        }

        Ok(Box::new(TcpClient::new(socket, peer)))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}
