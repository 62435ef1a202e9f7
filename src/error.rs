use std::io;
use std::time::Duration;

use thiserror::Error;

/// Which side of a byte-budgeted stream ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Read => f.write_str("read"),
            Direction::Write => f.write_str("write"),
        }
    }
}

/// Errors produced by the engine itself.
///
/// Handler code is free to fail with anything; those failures travel as
/// `anyhow::Error` and never need to fit in this enum.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A byte-budgeted stream was asked to move more bytes than it had left.
    #[error("the stream has exceeded the {direction} limit specified")]
    LimitExceeded { direction: Direction },

    #[error("TLS handshake did not complete within {0:?}")]
    HandshakeTimeout(Duration),

    #[error("TLS handshake failed: {0}")]
    Tls(io::Error),

    #[error("unknown HTTP method: {0:?}")]
    UnknownMethod(String),

    #[error("malformed header line: {0:?}")]
    MalformedHeader(String),

    #[error("invalid content-length: {0:?}")]
    InvalidContentLength(String),

    /// The client's stream was already handed to a connection.
    #[error("client stream already taken")]
    StreamTaken,

    #[error("certificate error: {0}")]
    Certificate(String),

    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    /// Wraps a budget violation so it can travel through `AsyncRead`/`AsyncWrite`.
    pub fn limit_exceeded(direction: Direction) -> io::Error {
        io::Error::other(Error::LimitExceeded { direction })
    }

    /// Returns the budget direction if `err` carries a [`Error::LimitExceeded`].
    pub fn exceeded_direction(err: &io::Error) -> Option<Direction> {
        err.get_ref()
            .and_then(|inner| inner.downcast_ref::<Error>())
            .and_then(|e| match e {
                Error::LimitExceeded { direction } => Some(*direction),
                _ => None,
            })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
