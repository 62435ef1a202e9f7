use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::watch;

use crate::error::Error;

/// Any duplex byte stream a connection can run over.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

pub type ClientStream = Box<dyn AsyncStream>;

/// Shared "close this client" switch.
///
/// Clones observe the same state. Closing is idempotent and can happen from
/// any task; whoever is waiting on [`CloseHandle::closed`] wakes up.
#[derive(Debug, Clone)]
pub struct CloseHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CloseHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Returns `true` for the call that actually closed it.
    pub fn close(&self) -> bool {
        !self.tx.send_replace(true)
    }

    pub fn is_closed(&self) -> bool {
        *self.tx.borrow()
    }

    pub async fn closed(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this only returns once closed.
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

impl Default for CloseHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// One accepted peer.
///
/// The stream can be taken exactly once; the connection that takes it owns
/// it from then on. Closing the client makes the owning connection stop and
/// drop the stream, which shuts the socket.
#[async_trait]
pub trait Client: Send {
    fn remote_addr(&self) -> SocketAddr;

    /// `false` once the client is closed, either from outside or by its
    /// connection after the peer went away. A peer that drops silently is
    /// noticed on the connection's next read, not before.
    fn is_connected(&self) -> bool;

    fn close_handle(&self) -> CloseHandle;

    fn close(&self) -> bool {
        self.close_handle().close()
    }

    /// Hands out the byte stream, running any setup it needs first.
    async fn open_stream(&mut self) -> crate::Result<ClientStream>;
}

/// A client over a plain, already connected stream.
#[derive(Debug)]
pub struct StreamClient<S> {
    stream: Option<S>,
    remote_addr: SocketAddr,
    closer: CloseHandle,
}

pub type TcpClient = StreamClient<TcpStream>;

impl<S> StreamClient<S> {
    pub fn new(stream: S, remote_addr: SocketAddr) -> Self {
        Self {
            stream: Some(stream),
            remote_addr,
            closer: CloseHandle::new(),
        }
    }
}

#[async_trait]
impl<S> Client for StreamClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    fn is_connected(&self) -> bool {
        !self.closer.is_closed()
    }

    fn close_handle(&self) -> CloseHandle {
        self.closer.clone()
    }

    fn close(&self) -> bool {
        self.closer.close()
    }

    async fn open_stream(&mut self) -> crate::Result<ClientStream> {
        if self.closer.is_closed() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                "client already closed",
            )));
        }

        let stream = self.stream.take().ok_or(Error::StreamTaken)?;
        Ok(Box::new(stream))
    }
}
