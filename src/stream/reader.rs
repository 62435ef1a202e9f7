use std::io;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Direction, Error};
use crate::stream::limited::ReadBudget;

pub const DEFAULT_BUFFER_SIZE: usize = 4096;
pub const DEFAULT_EMPTY_READ_DELAY: Duration = Duration::from_millis(100);
pub const DEFAULT_EMPTY_READ_RETRIES: u32 = 3;
pub const DEFAULT_MAX_LINE_LENGTH: usize = 16 * 1024;

/// Tuning knobs for [`ProtocolReader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderOptions {
    /// Size of the internal refill buffer.
    pub buffer_size: usize,
    /// Pause taken after a read that produced no bytes.
    pub empty_read_delay: Duration,
    /// Consecutive empty reads tolerated before the stream counts as ended.
    pub empty_read_retries: u32,
    /// Longest line `read_line` accepts, CR LF excluded.
    pub max_line_length: usize,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            empty_read_delay: DEFAULT_EMPTY_READ_DELAY,
            empty_read_retries: DEFAULT_EMPTY_READ_RETRIES,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

/// Line- and length-oriented reader for the HTTP/1.1 wire format.
///
/// The reader owns only the buffer and cursor; the stream is passed in on
/// every call. That lets a connection keep one reader (and any bytes it has
/// already pulled off the socket) for its whole lifetime while wrapping the
/// socket in fresh per-request streams.
///
/// An underlying read that yields zero bytes is not trusted as end-of-stream
/// straight away: the reader sleeps for [`ReaderOptions::empty_read_delay`]
/// and retries, giving up only after
/// [`ReaderOptions::empty_read_retries`] consecutive empty reads.
#[derive(Debug)]
pub struct ProtocolReader {
    buffer: Box<[u8]>,
    index: usize,
    count: usize,
    options: ReaderOptions,
}

impl ProtocolReader {
    pub fn new(options: ReaderOptions) -> Self {
        Self {
            buffer: vec![0u8; options.buffer_size.max(1)].into_boxed_slice(),
            index: 0,
            count: 0,
            options,
        }
    }

    pub fn options(&self) -> &ReaderOptions {
        &self.options
    }

    /// Bytes pulled off the stream but not consumed yet.
    pub fn buffered(&self) -> usize {
        self.count - self.index
    }

    /// Reads up to and excluding the next CR LF.
    ///
    /// Bytes map one-to-one onto `char`s (Latin-1), so arbitrary header bytes
    /// never fail to decode. A lone LF is kept as part of the line. Returns
    /// `None` if the stream ends before a full line arrives, and fails with
    /// `InvalidData` once the line outgrows
    /// [`ReaderOptions::max_line_length`].
    pub async fn read_line<S>(&mut self, stream: &mut S) -> io::Result<Option<String>>
    where
        S: AsyncRead + Unpin + ?Sized,
    {
        let mut line: Vec<u8> = Vec::with_capacity(64);

        loop {
            if self.index == self.count && !self.refill(stream).await? {
                return Ok(None);
            }

            let byte = self.buffer[self.index];
            self.index += 1;
            line.push(byte);

            if line.ends_with(b"\r\n") {
                line.truncate(line.len() - 2);
                return Ok(Some(line.into_iter().map(char::from).collect()));
            }

            // One byte of slack for a CR still waiting on its LF.
            if line.len() > self.options.max_line_length + 1 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("line longer than {} bytes", self.options.max_line_length),
                ));
            }
        }
    }

    /// Reads exactly `count` bytes, draining the internal buffer first.
    ///
    /// Memory grows with the bytes that actually arrive, at most one buffer
    /// at a time, so a large `count` costs nothing until the peer sends it.
    pub async fn read_bytes<S>(&mut self, stream: &mut S, count: usize) -> io::Result<Bytes>
    where
        S: AsyncRead + Unpin + ?Sized,
    {
        let mut out = BytesMut::with_capacity(count.min(self.buffer.len()));

        let buffered = self.buffered().min(count);
        out.extend_from_slice(&self.buffer[self.index..self.index + buffered]);
        self.index += buffered;

        let mut empty_reads = 0;
        while out.len() < count {
            // The buffer is drained here, so it doubles as the read chunk.
            self.index = 0;
            self.count = 0;

            let want = (count - out.len()).min(self.buffer.len());
            let n = stream.read(&mut self.buffer[..want]).await?;
            out.extend_from_slice(&self.buffer[..n]);

            if n > 0 {
                empty_reads = 0;
                continue;
            }

            if empty_reads == self.options.empty_read_retries {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("stream ended after {} of {} body bytes", out.len(), count),
                ));
            }
            empty_reads += 1;
            tokio::time::sleep(self.options.empty_read_delay).await;
        }

        Ok(out.freeze())
    }

    /// Pairs the reader with a stream for code that wants a single object.
    pub fn bind<'a, S>(&'a mut self, stream: &'a mut S) -> BoundReader<'a, S>
    where
        S: AsyncRead + Unpin + Send + ?Sized,
    {
        BoundReader {
            reader: self,
            stream,
            budget: unbudgeted::<S>,
        }
    }

    /// Like [`bind`](Self::bind), but `read_bytes` refuses up front a body
    /// that the stream's read budget cannot cover.
    pub fn bind_budgeted<'a, S>(&'a mut self, stream: &'a mut S) -> BoundReader<'a, S>
    where
        S: AsyncRead + ReadBudget + Unpin + Send + ?Sized,
    {
        BoundReader {
            reader: self,
            stream,
            budget: <S as ReadBudget>::read_budget,
        }
    }

    /// Issues one read into the buffer. `false` means the stream stayed empty
    /// through every retry.
    async fn refill<S>(&mut self, stream: &mut S) -> io::Result<bool>
    where
        S: AsyncRead + Unpin + ?Sized,
    {
        let mut empty_reads = 0;

        loop {
            let n = stream.read(&mut self.buffer).await?;
            if n > 0 {
                self.index = 0;
                self.count = n;
                return Ok(true);
            }

            if empty_reads == self.options.empty_read_retries {
                self.index = 0;
                self.count = 0;
                return Ok(false);
            }
            empty_reads += 1;
            tokio::time::sleep(self.options.empty_read_delay).await;
        }
    }
}

impl Default for ProtocolReader {
    fn default() -> Self {
        Self::new(ReaderOptions::default())
    }
}

/// The two primitives request parsing is built on.
#[async_trait]
pub trait LineReader: Send {
    async fn read_line(&mut self) -> io::Result<Option<String>>;

    async fn read_bytes(&mut self, count: usize) -> io::Result<Bytes>;
}

fn unbudgeted<S: ?Sized>(_: &S) -> Option<u64> {
    None
}

/// A [`ProtocolReader`] borrowed together with the stream it reads from.
pub struct BoundReader<'a, S: ?Sized> {
    reader: &'a mut ProtocolReader,
    stream: &'a mut S,
    budget: fn(&S) -> Option<u64>,
}

#[async_trait]
impl<'a, S> LineReader for BoundReader<'a, S>
where
    S: AsyncRead + Unpin + Send + ?Sized,
{
    async fn read_line(&mut self) -> io::Result<Option<String>> {
        self.reader.read_line(&mut *self.stream).await
    }

    async fn read_bytes(&mut self, count: usize) -> io::Result<Bytes> {
        // Buffered bytes were paid for when they were read.
        let from_stream = count.saturating_sub(self.reader.buffered()) as u64;
        if let Some(left) = (self.budget)(&*self.stream)
            && from_stream > left
        {
            return Err(Error::limit_exceeded(Direction::Read));
        }

        self.reader.read_bytes(&mut *self.stream, count).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick() -> ReaderOptions {
        ReaderOptions {
            buffer_size: 8,
            empty_read_delay: Duration::from_millis(1),
            empty_read_retries: 1,
            max_line_length: 64,
        }
    }

    #[tokio::test]
    async fn line_spanning_several_refills() {
        let mut input: &[u8] = b"a line longer than the buffer\r\nnext\r\n";
        let mut reader = ProtocolReader::new(quick());

        let first = reader.read_line(&mut input).await.unwrap();
        let second = reader.read_line(&mut input).await.unwrap();

        assert_eq!(first.as_deref(), Some("a line longer than the buffer"));
        assert_eq!(second.as_deref(), Some("next"));
    }

    #[tokio::test]
    async fn bare_line_feed_stays_in_the_line() {
        let mut input: &[u8] = b"one\ntwo\r\n";
        let mut reader = ProtocolReader::new(quick());

        let line = reader.read_line(&mut input).await.unwrap();
        assert_eq!(line.as_deref(), Some("one\ntwo"));
    }

    #[tokio::test]
    async fn high_bytes_decode_as_latin1() {
        let mut input: &[u8] = b"caf\xe9\r\n";
        let mut reader = ProtocolReader::new(quick());

        let line = reader.read_line(&mut input).await.unwrap();
        assert_eq!(line.as_deref(), Some("caf\u{e9}"));
    }

    #[tokio::test]
    async fn unterminated_line_is_none() {
        let mut input: &[u8] = b"no terminator";
        let mut reader = ProtocolReader::new(quick());

        assert_eq!(reader.read_line(&mut input).await.unwrap(), None);
    }

    #[tokio::test]
    async fn read_bytes_keeps_surplus_buffered() {
        let mut input: &[u8] = b"hdr\r\nabcXYZ";
        let mut reader = ProtocolReader::new(ReaderOptions {
            buffer_size: 64,
            ..quick()
        });

        reader.read_line(&mut input).await.unwrap();
        let body = reader.read_bytes(&mut input, 3).await.unwrap();

        assert_eq!(&body[..], b"abc");
        assert_eq!(reader.buffered(), 3);
    }

    #[tokio::test]
    async fn read_bytes_fails_on_short_stream() {
        let mut input: &[u8] = b"abc";
        let mut reader = ProtocolReader::new(quick());

        let err = reader.read_bytes(&mut input, 10).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn oversized_line_is_rejected() {
        let long = [b'a'; 100];
        let mut input: &[u8] = &long;
        let mut reader = ProtocolReader::new(quick());

        let err = reader.read_line(&mut input).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn line_at_the_limit_is_accepted() {
        let mut raw = vec![b'a'; 64];
        raw.extend_from_slice(b"\r\n");
        let mut input: &[u8] = &raw;
        let mut reader = ProtocolReader::new(quick());

        let line = reader.read_line(&mut input).await.unwrap().unwrap();
        assert_eq!(line.len(), 64);
    }

    #[tokio::test]
    async fn huge_count_only_allocates_what_arrives() {
        let mut input: &[u8] = b"abc";
        let mut reader = ProtocolReader::new(quick());

        let err = reader.read_bytes(&mut input, usize::MAX).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn budgeted_reader_refuses_body_past_the_budget() {
        let mut stream = crate::stream::LimitedStream::new(&b"hdr\r\nabc"[..], Some(64), None);
        let mut reader = ProtocolReader::new(quick());
        let mut bound = reader.bind_budgeted(&mut stream);

        bound.read_line().await.unwrap();
        let err = bound.read_bytes(1000).await.unwrap_err();

        assert_eq!(Error::exceeded_direction(&err), Some(Direction::Read));
    }
}
