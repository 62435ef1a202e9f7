//! Listeners, clients, and the server that ties them to the pipeline.
//!
//! - **`client`**: the [`Client`](client::Client) abstraction over one accepted peer
//! - **`listener`**: sources of clients, plain TCP included
//! - **`tls`**: TLS decorators for clients and listeners, PEM loading
//!
//! A [`Server`] runs one accept task per listener and one
//! [`Connection`] task per accepted client.

pub mod client;
pub mod listener;
pub mod tls;

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures_util::future::BoxFuture;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::{Config, MethodOverride};
use crate::error::Error;
use crate::handler::{CompressionHandler, Handler, Next, Pipeline, handler_fn};
use crate::http::connection::{Connection, ConnectionHandle, ConnectionId, ConnectionSettings};
use crate::http::context::Context;
use crate::http::parser::{FormMethodOverride, HeaderMethodOverride, HttpRequestParser, RequestParser};
use client::Client;
use listener::{Listener, TcpListenerAdapter};
use tls::TlsListener;

/// Pause after a failed accept before trying again.
pub const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Live connections, plus a wakeup for whoever waits for them to drain.
#[derive(Debug, Default)]
struct Registry {
    connections: DashMap<ConnectionId, ConnectionHandle>,
    drained: Notify,
}

/// Builds the request parser for a method override mode.
pub fn parser_for(mode: MethodOverride) -> Arc<dyn RequestParser> {
    match mode {
        MethodOverride::None => Arc::new(HttpRequestParser::new()),
        MethodOverride::Header => Arc::new(HeaderMethodOverride::new(HttpRequestParser::new())),
        MethodOverride::Form => Arc::new(FormMethodOverride::new(HttpRequestParser::new())),
    }
}

/// An HTTP server that has not started yet.
///
/// Handlers run in the order they were registered.
pub struct Server {
    listeners: Vec<Box<dyn Listener>>,
    handlers: Vec<Arc<dyn Handler>>,
    parser: Arc<dyn RequestParser>,
    settings: ConnectionSettings,
}

impl Server {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
            handlers: Vec::new(),
            parser: parser_for(MethodOverride::default()),
            settings: ConnectionSettings::default(),
        }
    }

    /// Binds every configured listener and registers compression, if any
    /// encodings are configured, as the first handler.
    pub async fn from_config(cfg: &Config) -> crate::Result<Self> {
        if cfg.listeners.is_empty() {
            return Err(Error::Config("no listeners configured".to_string()));
        }

        let mut server = Server::new()
            .with_parser(parser_for(cfg.method_override))
            .with_settings(cfg.connection_settings());

        for listener_cfg in &cfg.listeners {
            let listener = TcpListenerAdapter::bind(listener_cfg.address.as_str()).await?;

            match &listener_cfg.tls {
                Some(tls_cfg) => {
                    let acceptor = tls::load_acceptor(&tls_cfg.cert_path, &tls_cfg.key_path).await?;
                    server.use_listener(
                        TlsListener::new(listener, acceptor)
                            .with_handshake_timeout(tls_cfg.handshake_timeout()),
                    );
                }
                None => {
                    server.use_listener(listener);
                }
            }
        }

        if !cfg.compression.encodings.is_empty() {
            server.use_handler(CompressionHandler::from_names(
                &cfg.compression.encodings,
                cfg.compression.level,
            )?);
        }

        Ok(server)
    }

    pub fn with_parser(mut self, parser: Arc<dyn RequestParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_settings(mut self, settings: ConnectionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn use_listener(&mut self, listener: impl Listener + 'static) -> &mut Self {
        self.listeners.push(Box::new(listener));
        self
    }

    /// Appends a handler to the end of the pipeline.
    pub fn use_handler(&mut self, handler: impl Handler) -> &mut Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    pub fn use_fn<F>(&mut self, f: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut Context, Next<'a>) -> BoxFuture<'a, anyhow::Result<()>>
            + Send
            + Sync
            + 'static,
    {
        self.use_handler(handler_fn(f))
    }

    /// Starts accepting on every listener. Must be called inside a Tokio
    /// runtime.
    pub fn start(self) -> crate::Result<ServerHandle> {
        if self.listeners.is_empty() {
            return Err(Error::Config("no listeners registered".to_string()));
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let shared = Shared {
            pipeline: Pipeline::new(self.handlers),
            parser: self.parser,
            settings: self.settings,
            registry: Arc::new(Registry::default()),
        };

        let mut local_addrs = Vec::with_capacity(self.listeners.len());
        let mut tasks = Vec::with_capacity(self.listeners.len());

        for listener in self.listeners {
            local_addrs.push(listener.local_addr()?);
            tasks.push(tokio::spawn(accept_loop(
                listener,
                shared.clone(),
                shutdown_rx.clone(),
            )));
        }

        info!(
            listeners = local_addrs.len(),
            handlers = shared.pipeline.len(),
            "Server started"
        );

        Ok(ServerHandle {
            local_addrs,
            registry: shared.registry,
            shutdown: shutdown_tx,
            tasks,
        })
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("listeners", &self.listeners.len())
            .field("handlers", &self.handlers.len())
            .field("settings", &self.settings)
            .finish()
    }
}

#[derive(Clone)]
struct Shared {
    pipeline: Pipeline,
    parser: Arc<dyn RequestParser>,
    settings: ConnectionSettings,
    registry: Arc<Registry>,
}

async fn accept_loop(
    listener: Box<dyn Listener>,
    shared: Shared,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let accepted = tokio::select! {
            Ok(_) = shutdown.wait_for(|stop| *stop) => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok(client) => spawn_connection(client, &shared),
            Err(e) => {
                error!(error = %e, "Accept failed");
                // Errors such as EMFILE persist; pause instead of spinning.
                tokio::select! {
                    Ok(_) = shutdown.wait_for(|stop| *stop) => break,
                    _ = tokio::time::sleep(ACCEPT_ERROR_BACKOFF) => {}
                }
            }
        }
    }
}

fn spawn_connection(client: Box<dyn Client>, shared: &Shared) {
    let connection = Connection::with_parts(
        client,
        shared.pipeline.clone(),
        shared.parser.clone(),
        shared.settings,
    );

    let handle = connection.handle();
    let guard = RegistryGuard {
        registry: shared.registry.clone(),
        id: handle.id(),
    };
    shared.registry.connections.insert(handle.id(), handle);

    tokio::spawn(async move {
        let _guard = guard;
        connection.run().await;
    });
}

/// Drops the connection's registry entry when its task ends, even on panic.
struct RegistryGuard {
    registry: Arc<Registry>,
    id: ConnectionId,
}

impl Drop for RegistryGuard {
    fn drop(&mut self) {
        self.registry.connections.remove(&self.id);
        if self.registry.connections.is_empty() {
            self.registry.drained.notify_waiters();
        }
    }
}

/// Control handle for a running server.
pub struct ServerHandle {
    local_addrs: Vec<SocketAddr>,
    registry: Arc<Registry>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl ServerHandle {
    /// Bound addresses, in listener registration order.
    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.local_addrs
    }

    pub fn is_serving(&self) -> bool {
        !*self.shutdown.borrow() && self.tasks.iter().any(|task| !task.is_finished())
    }

    pub fn active_connections(&self) -> usize {
        self.registry.connections.len()
    }

    /// Snapshot of the live connections.
    pub fn connections(&self) -> Vec<ConnectionHandle> {
        self.registry
            .connections
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn connection(&self, id: ConnectionId) -> Option<ConnectionHandle> {
        self.registry.connections.get(&id).map(|entry| entry.value().clone())
    }

    /// Force-closes every live connection; listeners keep accepting.
    pub fn close_all_connections(&self) -> usize {
        self.registry
            .connections
            .iter()
            .filter(|entry| entry.value().close())
            .count()
    }

    /// Stops every accept loop, closes every connection, and waits for the
    /// connection tasks to finish.
    pub async fn shutdown(self) {
        let ServerHandle {
            registry,
            shutdown,
            tasks,
            ..
        } = self;

        shutdown.send_replace(true);

        for task in tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Accept task failed");
            }
        }

        let closed = registry
            .connections
            .iter()
            .filter(|entry| entry.value().close())
            .count();
        loop {
            // Registered before the check so a drain in between still wakes us.
            let drained = registry.drained.notified();
            if registry.connections.is_empty() {
                break;
            }
            drained.await;
        }

        info!(closed_connections = closed, "Server stopped");
    }
}

impl fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerHandle")
            .field("local_addrs", &self.local_addrs)
            .field("active_connections", &self.registry.connections.len())
            .finish()
    }
}
