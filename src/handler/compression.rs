use std::io::{self, Write};
use std::sync::Arc;

use async_trait::async_trait;
use flate2::Compression;
use flate2::write::{DeflateEncoder, GzEncoder};
use tracing::debug;

use crate::error::Error;
use crate::handler::{Handler, Next};
use crate::http::context::Context;
use crate::http::response::{Body, Response};

pub const DEFAULT_LEVEL: u32 = 6;

/// A content-coding that can be applied to a whole response.
#[async_trait]
pub trait Compressor: Send + Sync {
    /// Token used in `Accept-Encoding` and `Content-Encoding`.
    fn name(&self) -> &str;

    async fn compress(&self, response: Response) -> io::Result<Response>;
}

/// Buffers the body, encodes it, and swaps in a fresh `Content-Length`
/// followed by `Content-Encoding`.
async fn compress_with<F>(response: Response, name: &str, encode: F) -> io::Result<Response>
where
    F: FnOnce(&[u8]) -> io::Result<Vec<u8>>,
{
    let Response {
        status,
        mut headers,
        close_connection,
        body,
    } = response;

    let plain = body.into_bytes().await?;
    let encoded = encode(&plain)?;

    headers.remove("content-length");
    headers.append("Content-Length", encoded.len().to_string());
    headers.append("Content-Encoding", name);

    Ok(Response {
        status,
        headers,
        close_connection,
        body: Body::from(encoded),
    })
}

#[derive(Debug, Clone, Copy)]
pub struct GzipCompressor {
    level: u32,
}

impl GzipCompressor {
    pub fn new(level: u32) -> Self {
        Self { level }
    }
}

impl Default for GzipCompressor {
    fn default() -> Self {
        Self::new(DEFAULT_LEVEL)
    }
}

#[async_trait]
impl Compressor for GzipCompressor {
    fn name(&self) -> &str {
        "gzip"
    }

    async fn compress(&self, response: Response) -> io::Result<Response> {
        let level = Compression::new(self.level);
        compress_with(response, self.name(), |data| {
            let mut encoder = GzEncoder::new(Vec::new(), level);
            encoder.write_all(data)?;
            encoder.finish()
        })
        .await
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DeflateCompressor {
    level: u32,
}

impl DeflateCompressor {
    pub fn new(level: u32) -> Self {
        Self { level }
    }
}

impl Default for DeflateCompressor {
    fn default() -> Self {
        Self::new(DEFAULT_LEVEL)
    }
}

#[async_trait]
impl Compressor for DeflateCompressor {
    fn name(&self) -> &str {
        "deflate"
    }

    async fn compress(&self, response: Response) -> io::Result<Response> {
        let level = Compression::new(self.level);
        compress_with(response, self.name(), |data| {
            let mut encoder = DeflateEncoder::new(Vec::new(), level);
            encoder.write_all(data)?;
            encoder.finish()
        })
        .await
    }
}

/// Compresses whatever response the rest of the pipeline produced, using
/// the first configured compressor the client accepts.
///
/// Preference follows the configured order, not the order of the client's
/// `Accept-Encoding` list.
pub struct CompressionHandler {
    compressors: Vec<Arc<dyn Compressor>>,
}

impl CompressionHandler {
    pub fn new(compressors: Vec<Arc<dyn Compressor>>) -> Self {
        Self { compressors }
    }

    /// Builds compressors from encoding names such as `["gzip", "deflate"]`.
    pub fn from_names<S: AsRef<str>>(names: &[S], level: u32) -> crate::Result<Self> {
        let compressors = names
            .iter()
            .map(|name| -> crate::Result<Arc<dyn Compressor>> {
                match name.as_ref().to_ascii_lowercase().as_str() {
                    "gzip" => Ok(Arc::new(GzipCompressor::new(level))),
                    "deflate" => Ok(Arc::new(DeflateCompressor::new(level))),
                    other => Err(Error::Config(format!("unknown compression encoding {other:?}"))),
                }
            })
            .collect::<crate::Result<Vec<_>>>()?;

        Ok(Self::new(compressors))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.compressors.iter().map(|c| c.name())
    }

    fn negotiate(&self, accept_encoding: &str) -> Option<Arc<dyn Compressor>> {
        let accepted: Vec<&str> = accept_encoding.split(',').map(str::trim).collect();

        self.compressors
            .iter()
            .find(|c| accepted.iter().any(|token| token.eq_ignore_ascii_case(c.name())))
            .cloned()
    }
}

#[async_trait]
impl Handler for CompressionHandler {
    async fn handle(&self, ctx: &mut Context, next: Next<'_>) -> anyhow::Result<()> {
        next.run(ctx).await?;

        let Some(compressor) = ctx
            .request()
            .header("accept-encoding")
            .and_then(|accept| self.negotiate(accept))
        else {
            return Ok(());
        };

        let Some(response) = ctx.take_response() else {
            return Ok(());
        };

        debug!(encoding = compressor.name(), "Compressing response");
        ctx.set_response(compressor.compress(response).await?);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_name_is_rejected() {
        assert!(CompressionHandler::from_names(&["br"], 6).is_err());
    }

    #[test]
    fn names_keep_configured_order() {
        let handler = CompressionHandler::from_names(&["Deflate", "gzip"], 6).unwrap();
        assert_eq!(handler.names().collect::<Vec<_>>(), ["deflate", "gzip"]);
    }

    #[test]
    fn negotiation_ignores_case_and_spacing() {
        let handler = CompressionHandler::from_names(&["gzip"], 6).unwrap();

        assert!(handler.negotiate("identity ,  GZIP").is_some());
        assert!(handler.negotiate("br").is_none());
    }
}
