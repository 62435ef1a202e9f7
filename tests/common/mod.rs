#![allow(dead_code)]

use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, DuplexStream, ReadBuf};
use vigil::http::connection::ConnectionSettings;
use vigil::server::client::{Client, StreamClient};
use vigil::stream::ReaderOptions;

pub fn peer_addr() -> SocketAddr {
    "127.0.0.1:40000".parse().unwrap()
}

/// Settings that give up on a silent stream within a few milliseconds.
pub fn quick_settings() -> ConnectionSettings {
    ConnectionSettings {
        reader: quick_reader(),
        ..ConnectionSettings::default()
    }
}

pub fn quick_reader() -> ReaderOptions {
    ReaderOptions {
        buffer_size: 64,
        empty_read_delay: Duration::from_millis(1),
        empty_read_retries: 2,
        max_line_length: 1024,
    }
}

/// An in-memory client plus the far end of its stream.
pub fn duplex_client() -> (Box<dyn Client>, DuplexStream) {
    let (server_side, test_side) = tokio::io::duplex(64 * 1024);
    (Box::new(StreamClient::new(server_side, peer_addr())), test_side)
}

/// A parsed response as seen by the peer.
#[derive(Debug)]
pub struct RawResponse {
    pub status_line: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Reads exactly one `Content-Length` framed response.
pub async fn read_response<S: AsyncRead + Unpin>(stream: &mut S) -> RawResponse {
    let mut head = Vec::new();
    while !head.ends_with(b"\r\n\r\n") {
        let byte = stream.read_u8().await.expect("stream ended inside response head");
        head.push(byte);
    }

    let head = String::from_utf8(head).unwrap();
    let mut lines = head.trim_end().split("\r\n");
    let status_line = lines.next().unwrap().to_string();
    let headers: Vec<(String, String)> = lines
        .map(|line| {
            let (k, v) = line.split_once(": ").unwrap();
            (k.to_string(), v.to_string())
        })
        .collect();

    let len = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .map(|(_, v)| v.parse::<usize>().unwrap())
        .unwrap_or(0);

    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await.unwrap();

    RawResponse {
        status_line,
        headers,
        body,
    }
}

/// Asserts the peer sees end-of-stream.
pub async fn assert_closed<S: AsyncRead + Unpin>(stream: &mut S) {
    let mut rest = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut rest))
        .await
        .expect("connection was not closed")
        .unwrap();
    assert!(rest.is_empty(), "unexpected trailing bytes: {rest:?}");
}

/// Plays back a script of reads; an empty chunk is a zero-byte read.
pub struct Scripted {
    chunks: std::collections::VecDeque<Vec<u8>>,
}

impl Scripted {
    pub fn new(chunks: &[&[u8]]) -> Self {
        Self {
            chunks: chunks.iter().map(|c| c.to_vec()).collect(),
        }
    }
}

impl AsyncRead for Scripted {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        if let Some(mut chunk) = self.chunks.pop_front() {
            let n = chunk.len().min(buf.remaining());
            buf.put_slice(&chunk[..n]);
            if n < chunk.len() {
                self.chunks.push_front(chunk.split_off(n));
            }
        }
        Poll::Ready(Ok(()))
    }
}
