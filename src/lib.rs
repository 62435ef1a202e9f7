//! Vigil - embeddable HTTP/1.1 server engine
//!
//! Core library: listeners and clients (plain or TLS), a buffered request
//! parser, the per-connection keep-alive loop, and a composable handler
//! pipeline.

pub mod config;
pub mod error;
pub mod handler;
pub mod http;
pub mod server;
pub mod stream;

pub use error::{Error, Result};
