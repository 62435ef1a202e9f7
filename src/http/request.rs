use std::sync::OnceLock;

use bytes::Bytes;

use crate::http::headers::{Headers, Params, ParamsChain};
use crate::http::method::Method;

/// Represents a parsed HTTP request from a client.
///
/// A request never changes after parsing. Method override decorators build a
/// new value through [`Request::with_method`], which moves every other field
/// across untouched.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    protocol: String,
    uri: String,
    segments: Vec<String>,
    query: Params,
    headers: Headers,
    body: Bytes,
    form: OnceLock<Params>,
}

impl Request {
    pub(crate) fn from_wire(
        method: Method,
        protocol: String,
        target: &str,
        headers: Headers,
        body: Bytes,
    ) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, Params::parse(query)),
            None => (target, Params::new()),
        };

        Self {
            method,
            protocol,
            uri: path.to_string(),
            segments: path_segments(path),
            query,
            headers,
            body,
            form: OnceLock::new(),
        }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    /// Protocol token from the request line, normally `HTTP/1.1`.
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// Request path as sent, without the query string.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Percent-decoded path split on `/`, empty segments dropped.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn query(&self) -> &Params {
        &self.query
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Body decoded as `application/x-www-form-urlencoded`, parsed on first use.
    pub fn form(&self) -> &Params {
        self.form
            .get_or_init(|| Params::parse(&String::from_utf8_lossy(&self.body)))
    }

    /// Query parameters first, then form fields.
    pub fn params(&self) -> ParamsChain<'_> {
        ParamsChain::new([&self.query, self.form()])
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params().get(key)
    }

    /// Retrieves the Content-Length header value.
    ///
    /// Returns 0 if the header is missing or not a valid number.
    pub fn content_length(&self) -> u64 {
        self.headers.get_as("content-length").unwrap_or(0)
    }

    /// Whether the client asked for the connection to stay open.
    ///
    /// Only an explicit `Connection: Keep-Alive` counts; a missing header
    /// means close, whatever the protocol version.
    pub fn keep_alive(&self) -> bool {
        self.headers.keep_alive()
    }

    pub fn with_method(self, method: Method) -> Self {
        Self { method, ..self }
    }
}

fn path_segments(path: &str) -> Vec<String> {
    let decoded = match urlencoding::decode(path) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => String::from_utf8_lossy(&urlencoding::decode_binary(path.as_bytes())).into_owned(),
    };

    decoded
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Builder for constructing Request objects outside the parser.
#[derive(Debug)]
pub struct RequestBuilder {
    method: Method,
    protocol: String,
    target: String,
    headers: Headers,
    body: Bytes,
}

impl RequestBuilder {
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self {
            method,
            protocol: "HTTP/1.1".to_string(),
            target: target.into(),
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn build(self) -> Request {
        Request::from_wire(
            self.method,
            self.protocol,
            &self.target,
            self.headers,
            self.body,
        )
    }
}
