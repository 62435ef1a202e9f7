use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use pin_project_lite::pin_project;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::error::{Direction, Error};

pin_project! {
    /// Stream wrapper with independent read and write byte budgets.
    ///
    /// `None` means unlimited. A transfer that would take a budget below zero
    /// fails with [`Error::LimitExceeded`] (wrapped in an `io::Error`); it is
    /// never shortened to fit.
    #[derive(Debug)]
    pub struct LimitedStream<S> {
        #[pin]
        inner: S,
        read_remaining: Option<u64>,
        write_remaining: Option<u64>,
    }
}

impl<S> LimitedStream<S> {
    pub fn new(inner: S, read_limit: Option<u64>, write_limit: Option<u64>) -> Self {
        Self {
            inner,
            read_remaining: read_limit,
            write_remaining: write_limit,
        }
    }

    pub fn unlimited(inner: S) -> Self {
        Self::new(inner, None, None)
    }

    pub fn remaining_read(&self) -> Option<u64> {
        self.read_remaining
    }

    pub fn remaining_write(&self) -> Option<u64> {
        self.write_remaining
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

/// Streams that can say how many more bytes they will let a reader take.
pub trait ReadBudget {
    /// `None` means unlimited.
    fn read_budget(&self) -> Option<u64>;
}

impl<S> ReadBudget for LimitedStream<S> {
    fn read_budget(&self) -> Option<u64> {
        self.read_remaining
    }
}

fn charge(remaining: &mut Option<u64>, amount: u64, direction: Direction) -> io::Result<()> {
    if let Some(left) = remaining {
        *left = left
            .checked_sub(amount)
            .ok_or_else(|| Error::limit_exceeded(direction))?;
    }
    Ok(())
}

impl<S: AsyncRead> AsyncRead for LimitedStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.project();
        let before = buf.filled().len();

        ready!(this.inner.poll_read(cx, buf))?;

        let read = (buf.filled().len() - before) as u64;
        if let Err(e) = charge(this.read_remaining, read, Direction::Read) {
            buf.set_filled(before);
            return Poll::Ready(Err(e));
        }

        Poll::Ready(Ok(()))
    }
}

impl<S: AsyncWrite> AsyncWrite for LimitedStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.project();

        if let Some(left) = *this.write_remaining {
            if buf.len() as u64 > left {
                return Poll::Ready(Err(Error::limit_exceeded(Direction::Write)));
            }
        }

        let written = ready!(this.inner.poll_write(cx, buf))?;
        charge(this.write_remaining, written as u64, Direction::Write)?;

        Poll::Ready(Ok(written))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_shutdown(cx)
    }
}
