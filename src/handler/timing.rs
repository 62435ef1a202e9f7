use std::time::Instant;

use async_trait::async_trait;
use tracing::info;

use crate::handler::{Handler, Next};
use crate::http::context::Context;

/// Logs how long the rest of the pipeline took for each request.
#[derive(Debug, Default, Clone, Copy)]
pub struct TimingHandler;

impl TimingHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Handler for TimingHandler {
    async fn handle(&self, ctx: &mut Context, next: Next<'_>) -> anyhow::Result<()> {
        let started = Instant::now();
        let result = next.run(ctx).await;

        info!(
            method = %ctx.request().method(),
            uri = ctx.request().uri(),
            elapsed = ?started.elapsed(),
            "Request handled"
        );

        result
    }
}
