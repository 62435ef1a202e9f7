use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

use crate::handler::Pipeline;
use crate::http::context::Context;
use crate::http::parser::{HeaderMethodOverride, HttpRequestParser, RequestParser};
use crate::http::writer::ResponseWriter;
use crate::server::client::{Client, CloseHandle};
use crate::stream::{DeferredFlush, LimitedStream, ProtocolReader, ReaderOptions};

pub const DEFAULT_WRITE_BUFFER_SIZE: usize = 8192;

static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Where a connection is in its read-dispatch-write cycle.
///
/// ```text
/// Initializing ─▶ Reading ─▶ Dispatching ─▶ Writing ─┬─▶ Reading   (keep-alive)
///       │            │                               └─▶ Closed
///       └────────────┴─────────────────────────────────▶ Closed    (error / no request)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// TLS handshake (if any) and stream setup.
    Initializing,
    Reading,
    Dispatching,
    Writing,
    Closed,
}

/// Per-connection limits and buffer sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Bytes a single request may read; `None` is unlimited.
    pub read_limit: Option<u64>,
    /// Bytes a single response may write; `None` is unlimited.
    pub write_limit: Option<u64>,
    pub reader: ReaderOptions,
    pub write_buffer_size: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            read_limit: None,
            write_limit: None,
            reader: ReaderOptions::default(),
            write_buffer_size: DEFAULT_WRITE_BUFFER_SIZE,
        }
    }
}

#[derive(Debug)]
struct Status {
    state: ConnectionState,
    last_activity: Instant,
}

/// Outside view of a live connection. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    remote_addr: SocketAddr,
    closer: CloseHandle,
    status: Arc<Mutex<Status>>,
}

impl ConnectionHandle {
    fn new(id: ConnectionId, remote_addr: SocketAddr, closer: CloseHandle) -> Self {
        Self {
            id,
            remote_addr,
            closer,
            status: Arc::new(Mutex::new(Status {
                state: ConnectionState::Initializing,
                last_activity: Instant::now(),
            })),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn state(&self) -> ConnectionState {
        self.status().state
    }

    /// Time of the last successful read or write.
    pub fn last_activity(&self) -> Instant {
        self.status().last_activity
    }

    /// Force-closes the connection from any task. In-flight I/O is dropped.
    pub fn close(&self) -> bool {
        self.closer.close()
    }

    pub fn is_closed(&self) -> bool {
        self.closer.is_closed()
    }

    fn enter(&self, state: ConnectionState) {
        self.status().state = state;
    }

    fn touch(&self, state: ConnectionState) {
        let mut status = self.status();
        status.state = state;
        status.last_activity = Instant::now();
    }

    fn status(&self) -> MutexGuard<'_, Status> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One client, served request by request until it goes away.
pub struct Connection {
    client: Box<dyn Client>,
    reader: ProtocolReader,
    pipeline: Pipeline,
    parser: Arc<dyn RequestParser>,
    settings: ConnectionSettings,
    handle: ConnectionHandle,
}

impl Connection {
    pub fn new(client: Box<dyn Client>, pipeline: Pipeline) -> Self {
        let parser: Arc<dyn RequestParser> =
            Arc::new(HeaderMethodOverride::new(HttpRequestParser::new()));
        Self::with_parts(client, pipeline, parser, ConnectionSettings::default())
    }

    pub fn with_parts(
        client: Box<dyn Client>,
        pipeline: Pipeline,
        parser: Arc<dyn RequestParser>,
        settings: ConnectionSettings,
    ) -> Self {
        let handle = ConnectionHandle::new(
            ConnectionId::new(),
            client.remote_addr(),
            client.close_handle(),
        );

        Self {
            client,
            reader: ProtocolReader::new(settings.reader),
            pipeline,
            parser,
            settings,
            handle,
        }
    }

    pub fn handle(&self) -> ConnectionHandle {
        self.handle.clone()
    }

    /// Serves the client until it disconnects, asks to close, errors, or is
    /// closed through its handle. The client is always closed on return.
    pub async fn run(mut self) {
        let id = self.handle.id();
        let remote_addr = self.handle.remote_addr();
        let closer = self.client.close_handle();

        info!(connection_id = %id, remote_addr = %remote_addr, "Got client");

        let result = tokio::select! {
            result = self.serve() => result,
            _ = closer.closed() => {
                debug!(connection_id = %id, "Connection closed from outside");
                Ok(())
            }
        };

        if let Err(e) = result {
            warn!(connection_id = %id, remote_addr = %remote_addr, error = %e, "Error while serving");
        }

        self.handle.enter(ConnectionState::Closed);
        self.client.close();

        info!(connection_id = %id, remote_addr = %remote_addr, "Lost client");
    }

    async fn serve(&mut self) -> anyhow::Result<()> {
        let stream = self.client.open_stream().await?;
        let mut stream = BufWriter::with_capacity(self.settings.write_buffer_size, stream);
        let remote_addr = self.handle.remote_addr();

        loop {
            self.handle.enter(ConnectionState::Reading);

            let mut io = DeferredFlush::new(LimitedStream::new(
                &mut stream,
                self.settings.read_limit,
                self.settings.write_limit,
            ));

            let parsed = self.parser.parse(&mut self.reader.bind_budgeted(&mut io)).await?;
            let Some(request) = parsed else {
                debug!(connection_id = %self.handle.id(), "No request, closing");
                break;
            };

            self.handle.touch(ConnectionState::Dispatching);
            let keep_alive = request.keep_alive();

            let mut ctx = Context::new(request, remote_addr);
            self.pipeline.run(&mut ctx).await?;

            let close_requested = match ctx.take_response() {
                Some(response) => {
                    self.handle.enter(ConnectionState::Writing);
                    let close = response.close_connection;

                    ResponseWriter::new(response, ctx.parsed_cookies())
                        .write_to(&mut io)
                        .await?;

                    self.handle.touch(ConnectionState::Writing);
                    close
                }
                None => false,
            };

            if !keep_alive || close_requested {
                break;
            }
        }

        if let Err(e) = stream.shutdown().await {
            debug!(connection_id = %self.handle.id(), error = %e, "Stream shutdown failed");
        }

        Ok(())
    }
}
