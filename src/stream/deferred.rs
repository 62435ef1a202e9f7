use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use pin_project_lite::pin_project;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};

use crate::stream::limited::ReadBudget;

pin_project! {
    /// Passes reads and writes straight through but turns `flush` into a
    /// no-op. Buffered output only moves on [`DeferredFlush::explicit_flush`].
    ///
    /// Body writers such as `tokio::io::copy` flush when they finish; wrapping
    /// the connection in this keeps those intermediate flushes from pushing a
    /// half-written response onto the wire.
    #[derive(Debug)]
    pub struct DeferredFlush<S> {
        #[pin]
        inner: S,
    }
}

impl<S> DeferredFlush<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: AsyncWrite + Unpin> DeferredFlush<S> {
    pub async fn explicit_flush(&mut self) -> io::Result<()> {
        self.inner.flush().await
    }
}

impl<S: ReadBudget> ReadBudget for DeferredFlush<S> {
    fn read_budget(&self) -> Option<u64> {
        self.inner.read_budget()
    }
}

impl<S: AsyncRead> AsyncRead for DeferredFlush<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.project().inner.poll_read(cx, buf)
    }
}

impl<S: AsyncWrite> AsyncWrite for DeferredFlush<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.project().inner.poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_shutdown(cx)
    }
}
