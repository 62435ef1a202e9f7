use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::http::cookies::CookieStore;
use crate::http::response::{Body, Response};
use crate::stream::DeferredFlush;

const HTTP_VERSION: &str = "HTTP/1.1";

fn serialize_head(resp: &Response, cookies: Option<&CookieStore>) -> Vec<u8> {
    let mut buf = Vec::with_capacity(256);

    // Status line
    let status_line = format!(
        "{} {} {}\r\n",
        HTTP_VERSION,
        resp.status.as_u16(),
        resp.status.reason_phrase()
    );
    buf.extend_from_slice(status_line.as_bytes());

    for (k, v) in resp.headers.iter() {
        buf.extend_from_slice(k.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(v.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }

    if let Some(cookies) = cookies.filter(|c| c.touched()) {
        buf.extend_from_slice(cookies.to_cookie_data().as_bytes());
    }

    // Header/body separator
    buf.extend_from_slice(b"\r\n");

    buf
}

/// Puts one response on the wire.
pub struct ResponseWriter {
    head: Vec<u8>,
    body: Body,
}

impl ResponseWriter {
    /// `cookies` is written back as `Set-Cookie` lines only if it was touched.
    pub fn new(response: Response, cookies: Option<&CookieStore>) -> Self {
        Self {
            head: serialize_head(&response, cookies),
            body: response.body,
        }
    }

    /// Writes head and body, then flushes. Nothing before the final flush is
    /// allowed to reach the client.
    pub async fn write_to<S>(self, stream: &mut DeferredFlush<S>) -> io::Result<()>
    where
        S: AsyncWrite + Unpin,
    {
        stream.write_all(&self.head).await?;
        self.body.write_to(stream).await?;
        stream.explicit_flush().await
    }
}
