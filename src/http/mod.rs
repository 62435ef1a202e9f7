//! HTTP protocol implementation.
//!
//! This module implements the HTTP/1.1 side of the engine: parsing requests
//! off a client stream, handing them to the handler pipeline, and writing the
//! responses back, with keep-alive.
//!
//! # Architecture
//!
//! - **`connection`**: per-client loop and its state machine
//! - **`parser`**: request line and header parsing, method override decorators
//! - **`method`**: HTTP verbs and the memoized verb lookup
//! - **`headers`**: header list and decoded parameter sets
//! - **`request`**: immutable parsed request
//! - **`response`**: status codes, bodies, and the response builder
//! - **`cookies`**: request cookies and their `Set-Cookie` write-back
//! - **`context`**: per-request state handed to handlers
//! - **`writer`**: serializes and writes responses to the client
//!
//! # Connection State Machine
//!
//! ```text
//!        ┌──────────────────┐
//!        │   Initializing   │ ← TLS handshake, buffered stream setup
//!        └──────┬───────────┘
//!               ▼
//!        ┌──────────────────┐
//!        │     Reading      │ ← Parse the next request
//!        └──────┬───────────┘
//!               │ Request parsed
//!               ▼
//!        ┌──────────────────┐
//!        │   Dispatching    │ ← Run the handler pipeline
//!        └──────┬───────────┘
//!               │ Pipeline done
//!               ▼
//!        ┌──────────────────┐
//!        │     Writing      │ ← Send the response, flush
//!        └──────┬───────────┘
//!               ├─ Keep-Alive → Reading (same connection)
//!               └─ Close → Closed
//! ```
//!
//! # Example
//!
//! ```no_run
//! use vigil::handler::Pipeline;
//! use vigil::http::connection::Connection;
//! use vigil::server::listener::{Listener, TcpListenerAdapter};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let listener = TcpListenerAdapter::bind("127.0.0.1:8080").await?;
//!     let pipeline = Pipeline::default();
//!
//!     loop {
//!         let client = listener.accept().await?;
//!         tokio::spawn(Connection::new(client, pipeline.clone()).run());
//!     }
//! }
//! ```

pub mod connection;
pub mod context;
pub mod cookies;
pub mod headers;
pub mod method;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
