use async_trait::async_trait;
use tracing::debug;

use crate::error::Error;
use crate::http::headers::Headers;
use crate::http::method::MethodCache;
use crate::http::request::Request;
use crate::stream::LineReader;

pub const METHOD_OVERRIDE_HEADER: &str = "X-HTTP-Method-Override";
pub const METHOD_FIELD: &str = "_method";

/// Turns bytes from a [`LineReader`] into a [`Request`].
///
/// `Ok(None)` means "no request": the peer went away or sent something that
/// is not a request line. The connection closes quietly in that case, while
/// an `Err` is logged first.
#[async_trait]
pub trait RequestParser: Send + Sync {
    async fn parse(&self, reader: &mut dyn LineReader) -> crate::Result<Option<Request>>;
}

/// The HTTP/1.1 request-line and header parser.
#[derive(Debug, Default)]
pub struct HttpRequestParser {
    methods: MethodCache,
}

impl HttpRequestParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn methods(&self) -> &MethodCache {
        &self.methods
    }
}

#[async_trait]
impl RequestParser for HttpRequestParser {
    async fn parse(&self, reader: &mut dyn LineReader) -> crate::Result<Option<Request>> {
        let Some(line) = reader.read_line().await? else {
            return Ok(None);
        };

        let (Some(first), Some(last)) = (line.find(' '), line.rfind(' ')) else {
            return Ok(None);
        };
        if first == last {
            return Ok(None);
        }

        let verb = &line[..first];
        let target = &line[first + 1..last];
        let protocol = &line[last + 1..];

        let mut headers = Headers::new();
        loop {
            let Some(header) = reader.read_line().await? else {
                return Ok(None);
            };
            if header.is_empty() {
                break;
            }

            let (name, value) = header
                .split_once(": ")
                .ok_or_else(|| Error::MalformedHeader(header.clone()))?;
            headers.insert(name, value);
        }

        let content_length = match headers.get("content-length") {
            Some(raw) => raw
                .trim()
                .parse::<i64>()
                .map_err(|_| Error::InvalidContentLength(raw.to_string()))?,
            None => 0,
        };

        let body = if content_length > 0 {
            let len = usize::try_from(content_length)
                .map_err(|_| Error::InvalidContentLength(content_length.to_string()))?;
            reader.read_bytes(len).await?
        } else {
            bytes::Bytes::new()
        };

        let method = self
            .methods
            .provide(headers.get(METHOD_FIELD).unwrap_or(verb))?;

        debug!(method = %method, uri = %target, "Request received");

        Ok(Some(Request::from_wire(
            method,
            protocol.to_string(),
            target,
            headers,
            body,
        )))
    }
}

/// Replaces the method with the value of the `X-HTTP-Method-Override`
/// header, when the request carries one.
#[derive(Debug, Default)]
pub struct HeaderMethodOverride<P> {
    inner: P,
    methods: MethodCache,
}

impl<P> HeaderMethodOverride<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            methods: MethodCache::new(),
        }
    }
}

#[async_trait]
impl<P: RequestParser> RequestParser for HeaderMethodOverride<P> {
    async fn parse(&self, reader: &mut dyn LineReader) -> crate::Result<Option<Request>> {
        let Some(request) = self.inner.parse(reader).await? else {
            return Ok(None);
        };

        match request.header(METHOD_OVERRIDE_HEADER) {
            Some(name) => {
                let method = self.methods.provide(name)?;
                Ok(Some(request.with_method(method)))
            }
            None => Ok(Some(request)),
        }
    }
}

/// Replaces the method with the `_method` field of a form-encoded body.
#[derive(Debug, Default)]
pub struct FormMethodOverride<P> {
    inner: P,
    methods: MethodCache,
}

impl<P> FormMethodOverride<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            methods: MethodCache::new(),
        }
    }
}

#[async_trait]
impl<P: RequestParser> RequestParser for FormMethodOverride<P> {
    async fn parse(&self, reader: &mut dyn LineReader) -> crate::Result<Option<Request>> {
        let Some(request) = self.inner.parse(reader).await? else {
            return Ok(None);
        };

        match request.form().get(METHOD_FIELD) {
            Some(name) => {
                let method = self.methods.provide(name)?;
                Ok(Some(request.with_method(method)))
            }
            None => Ok(Some(request)),
        }
    }
}
