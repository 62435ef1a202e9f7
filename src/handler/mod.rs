//! Request handling pipeline.
//!
//! Handlers are registered in order and composed into a single chain. Each
//! one receives the request [`Context`] and a [`Next`] continuation standing
//! for the rest of the chain. It may
//!
//! - pass through: call `next.run(ctx)` and leave the outcome alone,
//! - short-circuit: set a response and return without calling `next`,
//! - wrap: do work before and after `next.run(ctx)`, e.g. rewrite the response.
//!
//! The continuation after the last handler does nothing.
//!
//! # Example
//!
//! ```
//! use vigil::handler::{handler_fn, Pipeline};
//! use vigil::http::response::Response;
//!
//! let hello = handler_fn(|ctx, _next| {
//!     Box::pin(async move {
//!         ctx.set_response(Response::ok("hello"));
//!         Ok(())
//!     })
//! });
//! let pipeline = Pipeline::new(vec![std::sync::Arc::new(hello)]);
//! assert_eq!(pipeline.len(), 1);
//! ```

pub mod compression;
pub mod timing;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;

use crate::http::context::Context;

pub use compression::{CompressionHandler, Compressor, DeflateCompressor, GzipCompressor};
pub use timing::TimingHandler;

/// One stage of the pipeline.
///
/// `next` may be run at most once; it is consumed by [`Next::run`], so a
/// handler cannot run it twice. Setting a response and then also running
/// `next` is allowed, but later handlers are free to replace that response.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, ctx: &mut Context, next: Next<'_>) -> anyhow::Result<()>;
}

/// The rest of the pipeline, from the point of view of one handler.
pub struct Next<'a> {
    rest: &'a [Arc<dyn Handler>],
}

impl<'a> Next<'a> {
    /// A continuation that does nothing.
    pub fn end() -> Self {
        Self { rest: &[] }
    }

    pub async fn run(self, ctx: &mut Context) -> anyhow::Result<()> {
        match self.rest.split_first() {
            Some((handler, rest)) => handler.handle(ctx, Next { rest }).await,
            None => Ok(()),
        }
    }

    /// Handlers still to run.
    pub fn remaining(&self) -> usize {
        self.rest.len()
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("remaining", &self.rest.len())
            .finish()
    }
}

/// Handlers composed in registration order. Cloning shares the chain.
#[derive(Clone, Default)]
pub struct Pipeline {
    handlers: Arc<[Arc<dyn Handler>]>,
}

impl Pipeline {
    pub fn new(handlers: Vec<Arc<dyn Handler>>) -> Self {
        Self {
            handlers: handlers.into(),
        }
    }

    pub async fn run(&self, ctx: &mut Context) -> anyhow::Result<()> {
        Next {
            rest: &self.handlers,
        }
        .run(ctx)
        .await
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

/// Handler backed by a closure. Build one with [`handler_fn`].
pub struct FnHandler<F> {
    f: F,
}

/// Turns `|ctx, next| Box::pin(async move { .. })` into a [`Handler`].
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: for<'a> Fn(&'a mut Context, Next<'a>) -> BoxFuture<'a, anyhow::Result<()>>
        + Send
        + Sync
        + 'static,
{
    FnHandler { f }
}

#[async_trait]
impl<F> Handler for FnHandler<F>
where
    F: for<'a> Fn(&'a mut Context, Next<'a>) -> BoxFuture<'a, anyhow::Result<()>>
        + Send
        + Sync
        + 'static,
{
    async fn handle(&self, ctx: &mut Context, next: Next<'_>) -> anyhow::Result<()> {
        (self.f)(ctx, next).await
    }
}
